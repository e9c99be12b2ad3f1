pub mod availability;
pub mod blueprint;
pub mod difficulty;
pub mod paper;
pub mod question;
