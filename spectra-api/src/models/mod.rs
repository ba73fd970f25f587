mod channel;

pub use channel::{Band, ChannelId, Levels, Temperatures, MAX_LEVEL};
