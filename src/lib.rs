pub mod capacity;
pub mod config;
pub mod device;
pub mod escalation;
pub mod exit_code;
pub mod inventory;
pub mod job;
pub mod logging;
pub mod logo;
pub mod progress;
pub mod session;
pub mod session_log;
pub mod task;
pub mod tool;
mod ui;

#[inline(always)]
pub fn main() {
    ui::main::main()
}
