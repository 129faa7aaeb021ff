pub mod builder;
pub mod external;
