mod helpers;
mod host;
mod transport;
