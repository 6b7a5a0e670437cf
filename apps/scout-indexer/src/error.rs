pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Service(#[from] scout_service::Error),
	#[error("Rebuild task failed: {0}")]
	Join(#[from] tokio::task::JoinError),
}
