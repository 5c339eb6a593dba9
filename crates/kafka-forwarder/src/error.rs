use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Consumer error: {0}")]
    Consumer(String),

    #[error("Producer error: {0}")]
    Producer(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for forwarder_types::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::InvalidConfig(message) => forwarder_types::Error::InvalidConfig(message),
            other => forwarder_types::Error::Transport(other.to_string()),
        }
    }
}
