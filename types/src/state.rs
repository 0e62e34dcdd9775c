//! State enums for the message pools and plugin servers.
//!
//! Process states only move forward: `can_transition_to` encodes the allowed
//! edges and repositories refuse anything else.

code_enum! {
    /// Processing state of an authenticated message (AM).
    pub enum AuthMsgProcessState {
        /// Inserted, provenance/trust not yet checked.
        Pending => "PENDING",
        /// Trusted; eligible for upper-protocol extraction.
        Proved => "PROVED",
        /// Could not be decoded.
        MsgIllegal => "MSG_ILLEGAL",
        /// Decoded but not trusted.
        MsgRejected => "MSG_REJECTED",
    }
}

impl AuthMsgProcessState {
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Proved)
                | (Self::Pending, Self::MsgIllegal)
                | (Self::Pending, Self::MsgRejected)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

code_enum! {
    /// Processing state of an SDP message.
    pub enum SdpMsgProcessState {
        /// Ready, not yet submitted to the destination chain.
        Pending => "PENDING",
        /// Waiting on a remote relayer or domain to act first.
        RemotePending => "REMOTE_PENDING",
        /// Submitted, awaiting confirmation.
        TxPending => "TX_PENDING",
        TxSuccess => "TX_SUCCESS",
        TxFailed => "TX_FAILED",
        MsgIllegal => "MSG_ILLEGAL",
        MsgRejected => "MSG_REJECTED",
    }
}

impl SdpMsgProcessState {
    pub fn can_transition_to(&self, next: Self) -> bool {
        use SdpMsgProcessState::*;
        matches!(
            (self, next),
            (Pending, RemotePending)
                | (Pending, TxPending)
                | (Pending, TxFailed)
                | (Pending, MsgIllegal)
                | (Pending, MsgRejected)
                | (RemotePending, TxPending)
                | (RemotePending, TxFailed)
                | (RemotePending, MsgRejected)
                | (TxPending, TxSuccess)
                | (TxPending, TxFailed)
        )
    }

    /// Terminal states are eligible for archiving.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::TxSuccess | Self::TxFailed | Self::MsgIllegal | Self::MsgRejected
        )
    }
}

code_enum! {
    /// Processing state of a uniform cross-chain packet (UCP).
    pub enum UcpProcessState {
        Pending => "PENDING",
        Proved => "PROVED",
        /// Provenance check failed; never advanced further.
        Rejected => "REJECTED",
    }
}

impl UcpProcessState {
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Proved) | (Self::Pending, Self::Rejected)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

code_enum! {
    /// Trust level carried by an authenticated message.
    pub enum AuthMsgTrustLevel {
        ZeroTrust => "ZERO_TRUST",
        PositiveTrust => "POSITIVE_TRUST",
        NegativeTrust => "NEGATIVE_TRUST",
    }
}

impl AuthMsgTrustLevel {
    /// Wire value used by the AuthMessage codec.
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::ZeroTrust => 0,
            Self::PositiveTrust => 1,
            Self::NegativeTrust => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::ZeroTrust),
            1 => Some(Self::PositiveTrust),
            2 => Some(Self::NegativeTrust),
            _ => None,
        }
    }
}

code_enum! {
    /// Upper-layer protocol carried inside an authenticated message.
    pub enum UpperProtocolType {
        Sdp => "SDP",
    }
}

impl UpperProtocolType {
    /// Wire value used by the AuthMessage codec.
    pub fn protocol_id(&self) -> u32 {
        match self {
            Self::Sdp => 0,
        }
    }

    pub fn from_protocol_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Self::Sdp),
            _ => None,
        }
    }
}

code_enum! {
    /// Readiness of a chain-bridging plugin server.
    pub enum PluginServerState {
        Init => "INIT",
        Ready => "READY",
        Stopped => "STOPPED",
        HeartbeatLost => "HEARTBEAT_LOST",
        NotFound => "NOT_FOUND",
    }
}

impl PluginServerState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}
