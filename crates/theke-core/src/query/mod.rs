pub mod guards;
pub mod search;
