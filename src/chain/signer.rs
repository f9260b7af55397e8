//! Local secp256k1 sender identity and EIP-155 legacy transaction signing

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::{decode_hex, keccak256, Address, TxHash, U256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey};
use rlp::RlpStream;

/// Address of a contract created by `sender` at `nonce`
pub fn create_address(sender: &Address, nonce: u64) -> Address {
    let mut stream = RlpStream::new_list(2);
    stream.append(sender);
    stream.append(&nonce);
    let hash = keccak256(stream.out());
    Address::from_slice(&hash[12..]).unwrap_or_default()
}

// ==================== Transactions ====================

/// Pre-EIP-1559 transaction, replay protected by chain id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    fn append_fields(&self, stream: &mut RlpStream) {
        stream.append(&self.nonce);
        stream.append(&self.gas_price);
        stream.append(&self.gas_limit);
        match &self.to {
            Some(to) => stream.append(to),
            None => stream.append_empty_data(),
        };
        stream.append(&self.value);
        stream.append(&self.data);
    }

    /// Hash signed over, per EIP-155
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut stream = RlpStream::new_list(9);
        self.append_fields(&mut stream);
        stream.append(&self.chain_id);
        stream.append(&0u8);
        stream.append(&0u8);
        keccak256(stream.out())
    }
}

/// Raw bytes ready for `eth_sendRawTransaction`, and their hash
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Vec<u8>,
    pub hash: TxHash,
}

/// Private key held in memory for the lifetime of the process
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl LocalSigner {
    pub fn from_hex(key: &str) -> OrchestratorResult<Self> {
        let bytes = decode_hex(key)
            .map_err(|_| OrchestratorError::Configuration("sender key is not valid hex".into()))?;
        let key = SigningKey::from_slice(&bytes).map_err(|_| {
            OrchestratorError::Configuration("sender key is not a valid secp256k1 key".into())
        })?;
        let address = address_of(&key);
        Ok(Self { key, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte digest, returning `(recovery id, r, s)`
    pub fn sign_hash(&self, hash: &[u8; 32]) -> Result<(u8, [u8; 32], [u8; 32]), String> {
        let (signature, recovery_id): (Signature, RecoveryId) = self
            .key
            .sign_prehash_recoverable(hash)
            .map_err(|e| format!("signing failed: {}", e))?;
        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok((recovery_id.to_byte(), r, s))
    }

    pub fn sign_legacy(&self, tx: &LegacyTransaction) -> Result<SignedTransaction, String> {
        let (recovery_id, r, s) = self.sign_hash(&tx.signing_hash())?;
        let v = tx.chain_id * 2 + 35 + u64::from(recovery_id);

        let mut stream = RlpStream::new_list(9);
        tx.append_fields(&mut stream);
        stream.append(&v);
        stream.append(&U256::from_big_endian(&r));
        stream.append(&U256::from_big_endian(&s));
        let raw = stream.out().to_vec();
        let hash = TxHash(keccak256(&raw));
        Ok(SignedTransaction { raw, hash })
    }
}

fn address_of(key: &SigningKey) -> Address {
    let point = key.verifying_key().to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..]).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encode_hex;
    use k256::ecdsa::VerifyingKey;

    // Well-known first development account
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_address_derivation() {
        let signer = LocalSigner::from_hex(DEV_KEY).unwrap();
        assert_eq!(
            signer.address().to_checksum(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn test_invalid_keys_rejected() {
        assert_eq!(LocalSigner::from_hex("zz").unwrap_err().kind(), "ConfigurationError");
        assert!(LocalSigner::from_hex("0x00").is_err());
    }

    #[test]
    fn test_eip155_signed_transaction() {
        // Key, transaction and raw encoding from the EIP-155 example
        let signer = LocalSigner::from_hex(&format!("0x{}", "46".repeat(32))).unwrap();
        let tx = LegacyTransaction {
            nonce: 9,
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: 21_000,
            to: Some("0x3535353535353535353535353535353535353535".parse().unwrap()),
            value: U256::exp10(18),
            data: Vec::new(),
            chain_id: 1,
        };
        let signed = signer.sign_legacy(&tx).unwrap();
        assert_eq!(
            encode_hex(&signed.raw),
            "0xf86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a7640000\
             8025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aec\
             b703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
    }

    #[test]
    fn test_eip155_signing_hash() {
        // Example transaction from EIP-155
        let tx = LegacyTransaction {
            nonce: 9,
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: 21_000,
            to: Some("0x3535353535353535353535353535353535353535".parse().unwrap()),
            value: U256::exp10(18),
            data: Vec::new(),
            chain_id: 1,
        };
        assert_eq!(
            encode_hex(&tx.signing_hash()),
            "0xdaf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_signature_recovers_sender() {
        let signer = LocalSigner::from_hex(DEV_KEY).unwrap();
        let hash = keccak256(b"berry");
        let (recovery_id, r, s) = signer.sign_hash(&hash).unwrap();

        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&r);
        bytes[32..].copy_from_slice(&s);
        let signature = Signature::from_slice(&bytes).unwrap();
        let recovered = VerifyingKey::recover_from_prehash(
            &hash,
            &signature,
            RecoveryId::from_byte(recovery_id).unwrap(),
        )
        .unwrap();
        let point = recovered.to_encoded_point(false);
        let address = Address::from_slice(&keccak256(&point.as_bytes()[1..])[12..]).unwrap();
        assert_eq!(address, signer.address());
    }

    #[test]
    fn test_signed_transaction_is_deterministic() {
        let signer = LocalSigner::from_hex(DEV_KEY).unwrap();
        let tx = LegacyTransaction {
            nonce: 0,
            gas_price: U256::from(1_000_000_000u64),
            gas_limit: 3_000_000,
            to: None,
            value: U256::zero(),
            data: vec![0x60, 0x80],
            chain_id: 57054,
        };
        let first = signer.sign_legacy(&tx).unwrap();
        let second = signer.sign_legacy(&tx).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.hash, TxHash(keccak256(&first.raw)));
        assert!(first.raw[0] >= 0xc0);
    }

    #[test]
    fn test_create_address() {
        // nonce 0 deployment from the first development account
        let sender: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert_eq!(
            create_address(&sender, 0).to_checksum(),
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        );
    }
}
