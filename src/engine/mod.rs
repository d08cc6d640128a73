pub mod control_loop;
pub mod events;
pub mod history;
pub mod prompt;
pub mod single_turn;
