pub mod check;
pub mod doctor;
pub mod refresh;
pub mod status;
