//! Fixed-layout relay envelope.
//!
//! ```text
//! offset 0    receiver identity, 32 bytes
//! offset 32   sender domain: 1 length byte + 128 bytes, zero padded
//! offset 161  flags, 4 bytes big-endian
//! offset 165  proofs, to the end
//! ```

use xrelay_types::{CrossChainDomain, Identity, MAX_DOMAIN_LEN};

use crate::{AmClient, ChainError, CrossChainReceipt, EnvelopeError};

pub const RECEIVER_IDENTITY_OFFSET: usize = 0;
pub const SENDER_DOMAIN_OFFSET: usize = 32;
pub const FLAGS_OFFSET: usize = SENDER_DOMAIN_OFFSET + 1 + MAX_DOMAIN_LEN;
pub const PROOFS_OFFSET: usize = FLAGS_OFFSET + 4;

/// Proof bytes of an envelope.
///
/// # Panics
///
/// Panics if `pkg` is shorter than the 165-byte header. Callers that cannot
/// guarantee the length use [`try_extract_proofs`].
pub fn extract_proofs(pkg: &[u8]) -> &[u8] {
    assert!(
        pkg.len() >= PROOFS_OFFSET,
        "relay envelope of {} bytes is shorter than the {PROOFS_OFFSET}-byte header",
        pkg.len()
    );
    &pkg[PROOFS_OFFSET..]
}

/// Checked variant of [`extract_proofs`].
pub fn try_extract_proofs(pkg: &[u8]) -> Result<&[u8], EnvelopeError> {
    if pkg.len() < PROOFS_OFFSET {
        return Err(EnvelopeError::TooShort {
            len: pkg.len(),
            min: PROOFS_OFFSET,
        });
    }
    Ok(extract_proofs(pkg))
}

/// Decoded relay envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayEnvelope {
    pub receiver_identity: Identity,
    pub sender_domain: CrossChainDomain,
    pub flags: u32,
    pub proofs: Vec<u8>,
}

impl RelayEnvelope {
    pub fn encode(&self) -> Vec<u8> {
        let domain = self.sender_domain.as_bytes();
        let mut out = Vec::with_capacity(PROOFS_OFFSET + self.proofs.len());
        out.extend_from_slice(self.receiver_identity.as_bytes());
        out.push(domain.len() as u8);
        out.extend_from_slice(domain);
        out.resize(FLAGS_OFFSET, 0);
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.proofs);
        out
    }

    pub fn decode(pkg: &[u8]) -> Result<Self, EnvelopeError> {
        let proofs = try_extract_proofs(pkg)?;
        let receiver_identity = Identity::from_slice(&pkg[RECEIVER_IDENTITY_OFFSET..SENDER_DOMAIN_OFFSET])
            .map_err(|_| EnvelopeError::TooShort {
                len: pkg.len(),
                min: PROOFS_OFFSET,
            })?;
        let domain_len = pkg[SENDER_DOMAIN_OFFSET] as usize;
        if domain_len == 0 || domain_len > MAX_DOMAIN_LEN {
            return Err(EnvelopeError::DomainLength(domain_len));
        }
        let start = SENDER_DOMAIN_OFFSET + 1;
        let domain = std::str::from_utf8(&pkg[start..start + domain_len])
            .map_err(|_| EnvelopeError::DomainEncoding)?;
        let sender_domain =
            CrossChainDomain::new(domain).map_err(|_| EnvelopeError::DomainLength(domain_len))?;
        let mut flags = [0u8; 4];
        flags.copy_from_slice(&pkg[FLAGS_OFFSET..PROOFS_OFFSET]);
        Ok(Self {
            receiver_identity,
            sender_domain,
            flags: u32::from_be_bytes(flags),
            proofs: proofs.to_vec(),
        })
    }
}

/// Unwrap an envelope and forward its proofs to the AM contract.
pub async fn relay_envelope<C: AmClient + ?Sized>(
    client: &C,
    pkg: &[u8],
    service_id: &str,
) -> Result<CrossChainReceipt, ChainError> {
    let proofs = try_extract_proofs(pkg)?;
    client.relay(proofs, service_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_165_bytes() {
        assert_eq!(FLAGS_OFFSET, 161);
        assert_eq!(PROOFS_OFFSET, 165);
    }

    #[test]
    fn extract_returns_the_tail() {
        let pkg: Vec<u8> = (0..200u32).map(|i| i as u8).collect();
        let proofs = extract_proofs(&pkg);
        assert_eq!(proofs.len(), 35);
        assert_eq!(proofs, &pkg[165..]);
        assert!(extract_proofs(&[0u8; 165]).is_empty());
    }

    #[test]
    #[should_panic(expected = "shorter than the 165-byte header")]
    fn extract_asserts_header_length() {
        extract_proofs(&[0u8; 164]);
    }

    #[test]
    fn checked_extract_is_a_typed_error() {
        assert_eq!(
            try_extract_proofs(&[0u8; 164]),
            Err(EnvelopeError::TooShort { len: 164, min: 165 })
        );
    }

    #[test]
    fn encode_places_fields_at_fixed_offsets() {
        let env = RelayEnvelope {
            receiver_identity: Identity::new([9; 32]),
            sender_domain: CrossChainDomain::new("chain-a").unwrap(),
            flags: 0x0102_0304,
            proofs: vec![0xee; 10],
        };
        let pkg = env.encode();
        assert_eq!(pkg.len(), 175);
        assert_eq!(pkg[32], 7);
        assert_eq!(&pkg[33..40], b"chain-a");
        assert!(pkg[40..161].iter().all(|b| *b == 0));
        assert_eq!(&pkg[161..165], &[1, 2, 3, 4]);
        assert_eq!(extract_proofs(&pkg), &[0xee; 10]);
        assert_eq!(RelayEnvelope::decode(&pkg).unwrap(), env);
    }

    #[test]
    fn decode_rejects_bad_domain_length() {
        let mut pkg = vec![0u8; 170];
        pkg[32] = 200;
        assert_eq!(RelayEnvelope::decode(&pkg), Err(EnvelopeError::DomainLength(200)));
        pkg[32] = 0;
        assert_eq!(RelayEnvelope::decode(&pkg), Err(EnvelopeError::DomainLength(0)));
    }
}
