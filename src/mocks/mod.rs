pub mod mock_front;

pub use mock_front::MockFront;
