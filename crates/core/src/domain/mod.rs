pub mod bug;
pub mod deployment;
pub mod member;
