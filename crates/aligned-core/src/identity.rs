// crates/aligned-core/src/identity.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256};

use crate::traits::TaskSigner;

/// Identity of an operator registered with the service manager.
///
/// Built once, fully populated, by whatever loads the operator's
/// configuration and keys. There are no setters: the run loop only ever sees
/// a complete identity.
#[derive(Clone)]
pub struct OperatorIdentity {
    address: Address,
    operator_id: B256,
    socket: String,
    timeout: Duration,
    signer: Arc<dyn TaskSigner>,
}

impl OperatorIdentity {
    pub fn new(
        address: Address,
        operator_id: B256,
        socket: impl Into<String>,
        timeout: Duration,
        signer: Arc<dyn TaskSigner>,
    ) -> Self {
        Self {
            address,
            operator_id,
            socket: socket.into(),
            timeout,
            signer,
        }
    }

    /// On-chain address of the operator.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Operator id as registered in the registry coordinator.
    pub fn operator_id(&self) -> B256 {
        self.operator_id
    }

    /// Socket the operator advertises to the network.
    pub fn socket(&self) -> &str {
        &self.socket
    }

    /// Timeout applied to outbound calls made on behalf of this operator.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The operator's signing key.
    pub fn signer(&self) -> &Arc<dyn TaskSigner> {
        &self.signer
    }
}

impl fmt::Debug for OperatorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorIdentity")
            .field("address", &self.address)
            .field("operator_id", &self.operator_id)
            .field("socket", &self.socket)
            .field("timeout", &self.timeout)
            .field("scheme", &self.signer.scheme())
            .field("public_key", &hex::encode(self.signer.public_key()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Ed25519Signer;

    #[test]
    fn test_debug_shows_public_key_only() {
        let signer = Ed25519Signer::from_secret(&[5u8; 32]);
        let public = hex::encode(signer.public_key_bytes());
        let identity = OperatorIdentity::new(
            Address::repeat_byte(0x11),
            B256::repeat_byte(0x22),
            "127.0.0.1:9000",
            Duration::from_secs(5),
            Arc::new(signer),
        );

        let rendered = format!("{:?}", identity);
        assert!(rendered.contains(&public));
        assert!(!rendered.contains(&hex::encode([5u8; 32])));
        assert_eq!(identity.socket(), "127.0.0.1:9000");
        assert_eq!(identity.timeout(), Duration::from_secs(5));
    }
}
