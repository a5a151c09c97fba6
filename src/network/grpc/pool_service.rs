//! RPC facade over one [`Pooler`].
//!
//! Mutations are retried on lock contention before anything reaches the
//! caller; pool errors are mapped to gRPC status codes through
//! `From<Error> for Status`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::async_trait;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tracing::debug;

use super::PoolChangesHandler;
use crate::async_task::retry_on_contention;
use crate::proto::DeleteRequest;
use crate::proto::GetRequest;
use crate::proto::GetResponse;
use crate::proto::MutationRequest;
use crate::proto::MutationResponse;
use crate::proto::PoolChangesRequest;
use crate::proto::PoolChangesResponse;
use crate::BackoffPolicy;
use crate::DocumentStore;
use crate::PoolRpc;
use crate::Poolable;
use crate::Pooler;
use crate::PoolerConfig;
use crate::StreamConfig;

pub struct PoolService<T: Poolable, S: DocumentStore> {
    pooler: Arc<Pooler<T, S>>,
    stream: StreamConfig,
    retry: BackoffPolicy,
    /// Parent of every stream's cancellation token
    shutdown: CancellationToken,
}

impl<T: Poolable, S: DocumentStore> PoolService<T, S> {
    pub fn new(
        pooler: Arc<Pooler<T, S>>,
        config: &PoolerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pooler,
            stream: config.stream.clone(),
            retry: config.retry.mutation,
            shutdown,
        }
    }

    pub fn pooler(&self) -> &Arc<Pooler<T, S>> {
        &self.pooler
    }

    fn decode(bytes: &[u8]) -> std::result::Result<T, Status> {
        bincode::deserialize(bytes).map_err(|e| Status::invalid_argument(format!("undecodable value: {e}")))
    }

    fn encode(value: &T) -> std::result::Result<Vec<u8>, Status> {
        bincode::serialize(value).map_err(|e| Status::internal(format!("unencodable value: {e}")))
    }

    fn mutation_response(
        value: &T,
        sequence: u32,
    ) -> std::result::Result<Response<MutationResponse>, Status> {
        Ok(Response::new(MutationResponse {
            value: Self::encode(value)?,
            sequence,
        }))
    }
}

#[async_trait]
impl<T: Poolable, S: DocumentStore> PoolRpc for PoolService<T, S> {
    type PoolChangesStream = ReceiverStream<std::result::Result<PoolChangesResponse, Status>>;

    #[tracing::instrument(skip_all, fields(collection = self.pooler.collection()))]
    async fn create(
        &self,
        request: Request<MutationRequest>,
    ) -> std::result::Result<Response<MutationResponse>, Status> {
        let request = request.into_inner();
        let value = Self::decode(&request.value)?;

        let (value, sequence) =
            retry_on_contention(&self.retry, || self.pooler.create(&request.name, value.clone())).await?;
        Self::mutation_response(&value, sequence)
    }

    #[tracing::instrument(skip_all, fields(collection = self.pooler.collection()))]
    async fn update(
        &self,
        request: Request<MutationRequest>,
    ) -> std::result::Result<Response<MutationResponse>, Status> {
        let request = request.into_inner();
        let value = Self::decode(&request.value)?;

        let (value, sequence) =
            retry_on_contention(&self.retry, || self.pooler.update(&request.name, value.clone())).await?;
        Self::mutation_response(&value, sequence)
    }

    #[tracing::instrument(skip_all, fields(collection = self.pooler.collection()))]
    async fn delete(
        &self,
        request: Request<DeleteRequest>,
    ) -> std::result::Result<Response<MutationResponse>, Status> {
        let request = request.into_inner();

        let (value, sequence) = retry_on_contention(&self.retry, || self.pooler.delete(&request.name)).await?;
        Self::mutation_response(&value, sequence)
    }

    async fn get(
        &self,
        request: Request<GetRequest>,
    ) -> std::result::Result<Response<GetResponse>, Status> {
        let request = request.into_inner();

        let response = match self.pooler.item(&request.name) {
            Some((value, sequence)) => GetResponse {
                value: Self::encode(&value)?,
                sequence,
                found: true,
            },
            None => GetResponse::default(),
        };
        Ok(Response::new(response))
    }

    async fn pool_changes(
        &self,
        request: Request<PoolChangesRequest>,
    ) -> std::result::Result<Response<Self::PoolChangesStream>, Status> {
        let request = request.into_inner();
        debug!(
            collection = self.pooler.collection(),
            start = request.start_sequence,
            "pool changes subscription"
        );

        let (tx, rx) = mpsc::channel(self.stream.channel_buffer);
        let handler = PoolChangesHandler::new(self.pooler.clone(), &request, &self.stream);
        tokio::spawn(handler.run(tx, self.shutdown.child_token()));

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
