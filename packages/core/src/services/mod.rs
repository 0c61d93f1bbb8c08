pub mod distance_matrix;
pub mod mock_provider;
