use kbase_config::Queue;
use kbase_storage::RedisQueue;

use crate::{BoxFuture, Channel, ResponseSink, Result, TaskQueue};

/// Redis-backed task source and response sink sharing one [`RedisQueue`].
pub struct RedisTransport {
	queue: RedisQueue,
	task_response_key: String,
	chat_response_key: String,
}
impl RedisTransport {
	pub async fn connect(cfg: &Queue) -> Result<Self> {
		let queue = RedisQueue::connect(cfg).await?;

		Ok(Self {
			queue,
			task_response_key: cfg.key(&cfg.task_response_queue),
			chat_response_key: cfg.key(&cfg.chat_response_queue),
		})
	}

	fn key(&self, channel: Channel) -> &str {
		match channel {
			Channel::Task => &self.task_response_key,
			Channel::Chat => &self.chat_response_key,
		}
	}
}
impl TaskQueue for RedisTransport {
	fn pop(&self) -> BoxFuture<'_, Result<Option<String>>> {
		Box::pin(async move { Ok(self.queue.pop().await?) })
	}
}
impl ResponseSink for RedisTransport {
	fn push<'a>(&'a self, channel: Channel, body: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(self.queue.push(self.key(channel), body).await?) })
	}
}
