#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error(transparent)]
	Redis(#[from] redis::RedisError),
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error("Timed out: {0}")]
	Timeout(String),
	#[error("Corrupt data: {0}")]
	Corrupt(String),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
}
