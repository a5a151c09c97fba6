//! Wire messages of the pool RPC surface.
//!
//! Values travel as opaque bincode bytes of the pooled type.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MutationRequest {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MutationResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub value: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub sequence: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteRequest {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetRequest {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub value: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub sequence: u32,
    #[prost(bool, tag = "3")]
    pub found: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PoolChangesRequest {
    /// Last sequence the subscriber has applied (0 for none)
    #[prost(uint32, tag = "1")]
    pub start_sequence: u32,
    /// Heartbeat interval; 0 selects the server default
    #[prost(uint64, tag = "2")]
    pub idle_timeout_ms: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PoolChange {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub sequence: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub value: ::prost::alloc::vec::Vec<u8>,
    #[prost(bool, tag = "4")]
    pub deleted: bool,
}

/// One batch of changes; empty for a heartbeat
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PoolChangesResponse {
    #[prost(message, repeated, tag = "1")]
    pub changes: ::prost::alloc::vec::Vec<PoolChange>,
}

impl PoolChangesResponse {
    pub fn heartbeat() -> Self {
        Self { changes: Vec::new() }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn last_sequence(&self) -> Option<u32> {
        self.changes.last().map(|change| change.sequence)
    }
}
