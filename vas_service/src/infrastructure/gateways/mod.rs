pub mod monnify;
pub mod peyflex;
