pub mod amplicon;
pub mod stage;
