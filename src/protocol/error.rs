//! Error codes returned by brokers.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_error_codes>

use thiserror::Error as ThisError;

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Error {
    #[error("The server experienced an unexpected error when processing the request.")]
    UnknownServerError,

    #[error("The requested offset is not within the range of offsets maintained by the server.")]
    OffsetOutOfRange,

    #[error("This message has failed its CRC checksum, exceeds the valid size, has a null key for a compacted topic, or is otherwise corrupt.")]
    CorruptMessage,

    #[error("This server does not host this topic-partition.")]
    UnknownTopicOrPartition,

    #[error("The requested fetch size is invalid.")]
    InvalidFetchSize,

    #[error("There is no leader for this topic-partition as we are in the middle of a leadership election.")]
    LeaderNotAvailable,

    #[error("For requests intended only for the leader, this error indicates that the broker is not the current leader.")]
    NotLeaderOrFollower,

    #[error("The request timed out.")]
    RequestTimedOut,

    #[error("The broker is not available.")]
    BrokerNotAvailable,

    #[error("The replica is not available for the requested topic-partition.")]
    ReplicaNotAvailable,

    #[error("The request included a message larger than the max message size the server will accept.")]
    MessageTooLarge,

    #[error("The controller moved to another broker.")]
    StaleControllerEpoch,

    #[error("The metadata field of the offset request was too large.")]
    OffsetMetadataTooLarge,

    #[error("The server disconnected before a response was received.")]
    NetworkException,

    #[error("The coordinator is loading and hence can't process requests.")]
    CoordinatorLoadInProgress,

    #[error("The coordinator is not available.")]
    CoordinatorNotAvailable,

    #[error("This is not the correct coordinator.")]
    NotCoordinator,

    #[error("The request attempted to perform an operation on an invalid topic.")]
    InvalidTopicException,

    #[error("The configured groupId is invalid.")]
    InvalidGroupId,

    #[error("The coordinator is not aware of this member.")]
    UnknownMemberId,

    #[error("The group is rebalancing, so a rejoin is needed.")]
    RebalanceInProgress,

    #[error("Topic authorization failed.")]
    TopicAuthorizationFailed,

    #[error("Group authorization failed.")]
    GroupAuthorizationFailed,

    #[error("Cluster authorization failed.")]
    ClusterAuthorizationFailed,

    #[error("The version of API is not supported.")]
    UnsupportedVersion,

    #[error("This is not the correct controller for this cluster.")]
    NotController,

    #[error("This most likely occurs because of a request being malformed by the client library or the message was sent to an incompatible broker.")]
    InvalidRequest,

    #[error("There are unstable offsets that need to be cleared.")]
    UnstableOffsetCommit,

    #[error("SASL Authentication failed.")]
    SaslAuthenticationFailed,

    #[error("The group id does not exist.")]
    GroupIdNotFound,

    #[error("There is no listener on the leader broker that matches the listener on which metadata request was processed.")]
    ListenerNotFound,

    #[error("The group member needs to have a valid member id before actually entering a consumer group.")]
    MemberIdRequired,

    #[error("Unknown error code {0}")]
    Unknown(i16),
}

impl Error {
    /// Map a wire error code, `0` meaning "no error".
    pub fn new(code: i16) -> Option<Self> {
        match code {
            0 => None,
            -1 => Some(Self::UnknownServerError),
            1 => Some(Self::OffsetOutOfRange),
            2 => Some(Self::CorruptMessage),
            3 => Some(Self::UnknownTopicOrPartition),
            4 => Some(Self::InvalidFetchSize),
            5 => Some(Self::LeaderNotAvailable),
            6 => Some(Self::NotLeaderOrFollower),
            7 => Some(Self::RequestTimedOut),
            8 => Some(Self::BrokerNotAvailable),
            9 => Some(Self::ReplicaNotAvailable),
            10 => Some(Self::MessageTooLarge),
            11 => Some(Self::StaleControllerEpoch),
            12 => Some(Self::OffsetMetadataTooLarge),
            13 => Some(Self::NetworkException),
            14 => Some(Self::CoordinatorLoadInProgress),
            15 => Some(Self::CoordinatorNotAvailable),
            16 => Some(Self::NotCoordinator),
            17 => Some(Self::InvalidTopicException),
            24 => Some(Self::InvalidGroupId),
            25 => Some(Self::UnknownMemberId),
            27 => Some(Self::RebalanceInProgress),
            29 => Some(Self::TopicAuthorizationFailed),
            30 => Some(Self::GroupAuthorizationFailed),
            31 => Some(Self::ClusterAuthorizationFailed),
            35 => Some(Self::UnsupportedVersion),
            41 => Some(Self::NotController),
            42 => Some(Self::InvalidRequest),
            58 => Some(Self::SaslAuthenticationFailed),
            69 => Some(Self::GroupIdNotFound),
            72 => Some(Self::ListenerNotFound),
            79 => Some(Self::MemberIdRequired),
            88 => Some(Self::UnstableOffsetCommit),
            _ => Some(Self::Unknown(code)),
        }
    }

    pub fn code(&self) -> i16 {
        match self {
            Self::UnknownServerError => -1,
            Self::OffsetOutOfRange => 1,
            Self::CorruptMessage => 2,
            Self::UnknownTopicOrPartition => 3,
            Self::InvalidFetchSize => 4,
            Self::LeaderNotAvailable => 5,
            Self::NotLeaderOrFollower => 6,
            Self::RequestTimedOut => 7,
            Self::BrokerNotAvailable => 8,
            Self::ReplicaNotAvailable => 9,
            Self::MessageTooLarge => 10,
            Self::StaleControllerEpoch => 11,
            Self::OffsetMetadataTooLarge => 12,
            Self::NetworkException => 13,
            Self::CoordinatorLoadInProgress => 14,
            Self::CoordinatorNotAvailable => 15,
            Self::NotCoordinator => 16,
            Self::InvalidTopicException => 17,
            Self::InvalidGroupId => 24,
            Self::UnknownMemberId => 25,
            Self::RebalanceInProgress => 27,
            Self::TopicAuthorizationFailed => 29,
            Self::GroupAuthorizationFailed => 30,
            Self::ClusterAuthorizationFailed => 31,
            Self::UnsupportedVersion => 35,
            Self::NotController => 41,
            Self::InvalidRequest => 42,
            Self::SaslAuthenticationFailed => 58,
            Self::GroupIdNotFound => 69,
            Self::ListenerNotFound => 72,
            Self::MemberIdRequired => 79,
            Self::UnstableOffsetCommit => 88,
            Self::Unknown(code) => *code,
        }
    }

    /// Errors a broker documents as transient; the same request may succeed later.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::CorruptMessage
                | Self::UnknownTopicOrPartition
                | Self::LeaderNotAvailable
                | Self::NotLeaderOrFollower
                | Self::RequestTimedOut
                | Self::ReplicaNotAvailable
                | Self::NetworkException
                | Self::CoordinatorLoadInProgress
                | Self::CoordinatorNotAvailable
                | Self::NotCoordinator
                | Self::UnstableOffsetCommit
        )
    }
}
