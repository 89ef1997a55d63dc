use redis::{Client, aio::MultiplexedConnection};

use crate::Result;

/// Redis lists used as the task queue (`BLPOP`) and the response queues (`RPUSH`).
///
/// Pops and pushes use separate connections so a blocked `BLPOP` never delays a response.
pub struct RedisQueue {
	pop_conn: MultiplexedConnection,
	push_conn: MultiplexedConnection,
	task_key: String,
	block_timeout_secs: u64,
}
impl RedisQueue {
	pub async fn connect(cfg: &kbase_config::Queue) -> Result<Self> {
		let client = Client::open(cfg.redis_url.as_str())?;
		let pop_conn = client.get_multiplexed_async_connection().await?;
		let push_conn = client.get_multiplexed_async_connection().await?;
		let task_key = cfg.key(&cfg.task_queue);

		tracing::info!(
			task_key = %task_key,
			block_timeout_secs = cfg.block_timeout_secs,
			"Connected to Redis task queue."
		);

		Ok(Self { pop_conn, push_conn, task_key, block_timeout_secs: cfg.block_timeout_secs })
	}

	/// Waits up to the configured timeout for the next task body. `None` means the wait timed
	/// out with an empty queue.
	pub async fn pop(&self) -> Result<Option<String>> {
		let mut conn = self.pop_conn.clone();
		let item: Option<(String, String)> = redis::cmd("BLPOP")
			.arg(&self.task_key)
			.arg(self.block_timeout_secs)
			.query_async(&mut conn)
			.await?;

		Ok(item.map(|(_, body)| body))
	}

	pub async fn push(&self, key: &str, body: &str) -> Result<()> {
		let mut conn = self.push_conn.clone();
		let _: i64 = redis::cmd("RPUSH").arg(key).arg(body).query_async(&mut conn).await?;

		Ok(())
	}
}
