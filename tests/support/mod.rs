pub mod mock_receiver;

pub use mock_receiver::MockReceiver;
