pub mod openai_mock;
pub mod anthropic_mock;

pub use openai_mock::{setup_openai_mock, setup_openai_streaming_mock};
pub use anthropic_mock::{
    setup_anthropic_mock,
    setup_anthropic_streaming_mock,
    setup_anthropic_mock_with_cache,
};
