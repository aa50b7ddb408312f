pub mod alert;
pub mod iqamah;
pub mod model;
pub mod schedule;
pub mod time_math;
pub mod tracker;
