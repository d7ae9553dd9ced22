mod subscriber;

pub use subscriber::init;
