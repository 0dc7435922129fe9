mod dead_letter;
mod redis_bus;

pub use dead_letter::{DeadLetter, DeadLetterSink, RedisDeadLetterQueue};
pub use redis_bus::{EventStream, RedisSubscriber, Subscriber};
