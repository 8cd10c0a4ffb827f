pub mod command;
pub mod fastx;
pub mod file;
pub mod naming;
pub mod process;
pub mod sample;
pub mod system;
