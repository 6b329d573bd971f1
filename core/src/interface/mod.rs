pub mod response;
pub mod segment;

pub use response::{sample_response_curve, Response, ResponsePoint, ResponseProvider};
pub use segment::{ChannelData, ChannelId, Segment, TimeInterval};
