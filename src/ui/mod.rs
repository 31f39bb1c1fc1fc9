pub mod cli;
pub mod main;
mod simple;
