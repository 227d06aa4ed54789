mod error;
mod logger;
mod sim;
