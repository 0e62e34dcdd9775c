//! Binary codecs for AuthMessage, SDP message and relay proof bundles.
//!
//! All integers are big-endian; variable-length fields carry a `u32` length
//! prefix except the SDP receiver domain, which uses one length byte.

use xrelay_types::{AuthMsgTrustLevel, CrossChainDomain, Identity, UpperProtocolType, MAX_DOMAIN_LEN};

use crate::CodecError;

pub const AUTH_MESSAGE_VERSION: u32 = 2;
pub const SDP_MESSAGE_VERSION: u32 = 1;

/// Cross-chain authenticated message as emitted by a source AM contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthMessage {
    /// Sender contract on the source chain.
    pub identity: Identity,
    pub trust_level: AuthMsgTrustLevel,
    pub upper_protocol: UpperProtocolType,
    pub payload: Vec<u8>,
}

impl AuthMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + 32 + 1 + 4 + 4 + self.payload.len());
        out.extend_from_slice(&AUTH_MESSAGE_VERSION.to_be_bytes());
        out.extend_from_slice(self.identity.as_bytes());
        out.push(self.trust_level.as_u8());
        out.extend_from_slice(&self.upper_protocol.protocol_id().to_be_bytes());
        put_bytes(&mut out, &self.payload);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let version = r.u32("am version")?;
        if version != AUTH_MESSAGE_VERSION {
            return Err(CodecError::UnsupportedVersion {
                kind: "AuthMessage",
                version,
            });
        }
        let identity = Identity::new(r.array32("am identity")?);
        let trust = r.u8("am trust level")?;
        let trust_level = AuthMsgTrustLevel::from_u8(trust).ok_or(CodecError::UnknownTrustLevel(trust))?;
        let protocol = r.u32("am upper protocol")?;
        let upper_protocol =
            UpperProtocolType::from_protocol_id(protocol).ok_or(CodecError::UnknownProtocol(protocol))?;
        let payload = r.bytes("am payload")?;
        r.finish()?;
        Ok(Self {
            identity,
            trust_level,
            upper_protocol,
            payload,
        })
    }
}

/// SDP message carried as an AuthMessage payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SdpMessage {
    pub receiver_domain: CrossChainDomain,
    pub receiver_identity: Identity,
    /// `UNORDERED_SEQUENCE` for unordered delivery.
    pub sequence: u32,
    pub payload: Vec<u8>,
}

impl SdpMessage {
    pub fn encode(&self) -> Vec<u8> {
        let domain = self.receiver_domain.as_bytes();
        let mut out = Vec::with_capacity(4 + 1 + domain.len() + 32 + 4 + 4 + self.payload.len());
        out.extend_from_slice(&SDP_MESSAGE_VERSION.to_be_bytes());
        // CrossChainDomain guarantees 1..=128 bytes.
        out.push(domain.len() as u8);
        out.extend_from_slice(domain);
        out.extend_from_slice(self.receiver_identity.as_bytes());
        out.extend_from_slice(&self.sequence.to_be_bytes());
        put_bytes(&mut out, &self.payload);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let version = r.u32("sdp version")?;
        if version != SDP_MESSAGE_VERSION {
            return Err(CodecError::UnsupportedVersion {
                kind: "SdpMessage",
                version,
            });
        }
        let domain_len = r.u8("sdp domain length")? as usize;
        if domain_len == 0 || domain_len > MAX_DOMAIN_LEN {
            return Err(CodecError::InvalidDomain(format!("length {domain_len}")));
        }
        let domain = r.take("sdp domain", domain_len)?;
        let domain = std::str::from_utf8(domain)
            .map_err(|_| CodecError::InvalidDomain("not utf-8".to_string()))?;
        let receiver_domain =
            CrossChainDomain::new(domain).map_err(|e| CodecError::InvalidDomain(e.to_string()))?;
        let receiver_identity = Identity::new(r.array32("sdp receiver identity")?);
        let sequence = r.u32("sdp sequence")?;
        let payload = r.bytes("sdp payload")?;
        r.finish()?;
        Ok(Self {
            receiver_domain,
            receiver_identity,
            sequence,
            payload,
        })
    }
}

/// Raw AuthMessage plus its ledger proof, carried as relay envelope proofs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofBundle {
    pub raw_message: Vec<u8>,
    pub ledger_proof: Vec<u8>,
}

impl ProofBundle {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.raw_message.len() + self.ledger_proof.len());
        put_bytes(&mut out, &self.raw_message);
        put_bytes(&mut out, &self.ledger_proof);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let raw_message = r.bytes("bundle message")?;
        let ledger_proof = r.bytes("bundle proof")?;
        r.finish()?;
        Ok(Self {
            raw_message,
            ledger_proof,
        })
    }
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, what: &'static str, n: usize) -> Result<&'a [u8], CodecError> {
        let have = self.data.len() - self.pos;
        if have < n {
            return Err(CodecError::Truncated { what, need: n, have });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, CodecError> {
        Ok(self.take(what, 1)?[0])
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, CodecError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(what, 4)?);
        Ok(u32::from_be_bytes(buf))
    }

    fn array32(&mut self, what: &'static str) -> Result<[u8; 32], CodecError> {
        let mut buf = [0u8; 32];
        buf.copy_from_slice(self.take(what, 32)?);
        Ok(buf)
    }

    fn bytes(&mut self, what: &'static str) -> Result<Vec<u8>, CodecError> {
        let len = self.u32(what)? as usize;
        Ok(self.take(what, len)?.to_vec())
    }

    fn finish(&self) -> Result<(), CodecError> {
        match self.data.len() - self.pos {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}
