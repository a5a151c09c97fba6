//! RPC surface of a pooler: mutations, point reads and the catch-up stream,
//! plus the subscriber-side mirror consuming that stream.
pub mod grpc;
mod mirror;
pub mod proto;

pub use grpc::*;
pub use mirror::*;

#[cfg(test)]
mod mirror_test;

use tokio_stream::Stream;
use tonic::async_trait;
use tonic::Request;
use tonic::Response;
use tonic::Status;

use self::proto::DeleteRequest;
use self::proto::GetRequest;
use self::proto::GetResponse;
use self::proto::MutationRequest;
use self::proto::MutationResponse;
use self::proto::PoolChangesRequest;
use self::proto::PoolChangesResponse;

/// Server side of the pool RPC surface
#[async_trait]
pub trait PoolRpc: Send + Sync + 'static {
    type PoolChangesStream: Stream<Item = std::result::Result<PoolChangesResponse, Status>> + Send + 'static;

    async fn create(
        &self,
        request: Request<MutationRequest>,
    ) -> std::result::Result<Response<MutationResponse>, Status>;

    async fn update(
        &self,
        request: Request<MutationRequest>,
    ) -> std::result::Result<Response<MutationResponse>, Status>;

    async fn delete(
        &self,
        request: Request<DeleteRequest>,
    ) -> std::result::Result<Response<MutationResponse>, Status>;

    async fn get(
        &self,
        request: Request<GetRequest>,
    ) -> std::result::Result<Response<GetResponse>, Status>;

    /// Replays retained changes after `start_sequence`, then live-tails.
    ///
    /// The stream ends with `OUT_OF_RANGE` when `start_sequence` was evicted
    /// from the offset window.
    async fn pool_changes(
        &self,
        request: Request<PoolChangesRequest>,
    ) -> std::result::Result<Response<Self::PoolChangesStream>, Status>;
}
