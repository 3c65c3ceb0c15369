pub mod ai_engineering;
pub mod aws_blog;
pub mod feed_collector;

pub use ai_engineering::AiEngineeringSearch;
pub use aws_blog::AwsBlogSearch;
pub use feed_collector::FeedCollector;
