//! Proof checking for RFC 6962 merkle trees.
//!
//! Everything here is pure: no I/O, no shared state. The client runs every
//! server response through these checks before it trusts it.

use crate::encoding::to_base64;
use crate::hasher::HashProvider;
use crate::signature::SignatureVerifier;
use crate::types::SignedLogRoot;

/// Reasons a proof or signature was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// The leaf index is outside the tree the proof claims to be for
    #[error("index {index} out of range for tree size {tree_size}")]
    IndexOutOfRange { index: u64, tree_size: u64 },
    /// The proof does not have the number of nodes the tree shape requires
    #[error("wrong proof size: got {got} nodes, want {want}")]
    WrongProofSize { got: usize, want: usize },
    /// A proof node or root does not have the hasher's digest size
    #[error("hash of {got} bytes, want {want}")]
    WrongHashSize { got: usize, want: usize },
    /// The root recomputed from the proof differs from the claimed one
    #[error("root mismatch: computed {}, expected {}", to_base64(.computed), to_base64(.expected))]
    RootMismatch { computed: Vec<u8>, expected: Vec<u8> },
    /// The second tree is smaller than the first
    #[error("tree shrank from {size1} to {size2}")]
    SizeDecrease { size1: u64, size2: u64 },
    /// The server signature over a root did not verify
    #[error("invalid signature over root of size {tree_size}")]
    InvalidSignature { tree_size: u64 },
}

/// Checks inclusion and consistency proofs using a particular hasher
#[derive(Debug, Clone, Default)]
pub struct MerkleVerifier<H> {
    hasher: H,
}

impl<H: HashProvider> MerkleVerifier<H> {
    /// Creates a verifier for trees built with `hasher`
    pub const fn new(hasher: H) -> Self {
        Self { hasher }
    }

    /// The hasher this verifier combines nodes with
    pub const fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Verifies that `leaf_hash` sits at `index` in the tree of `tree_size` leaves with root `root_hash`
    ///
    /// # Errors
    ///
    /// - `IndexOutOfRange`: if `index >= tree_size`,
    /// - `WrongProofSize`: if the audit path has the wrong length for this position,
    /// - `RootMismatch`: if the recomputed root differs from `root_hash`.
    pub fn verify_inclusion(
        &self,
        leaf_hash: &[u8],
        index: u64,
        tree_size: u64,
        root_hash: &[u8],
        proof: &[Vec<u8>],
    ) -> Result<(), VerificationError> {
        let computed = self.root_from_inclusion_proof(leaf_hash, index, tree_size, proof)?;
        expect_root(computed, root_hash)
    }

    /// Recomputes the root implied by an audit path
    ///
    /// # Errors
    ///
    /// See [`MerkleVerifier::verify_inclusion`].
    pub fn root_from_inclusion_proof(
        &self,
        leaf_hash: &[u8],
        index: u64,
        tree_size: u64,
        proof: &[Vec<u8>],
    ) -> Result<Vec<u8>, VerificationError> {
        if index >= tree_size {
            return Err(VerificationError::IndexOutOfRange { index, tree_size });
        }
        self.check_hash_size(leaf_hash)?;
        let (inner, border) = decompose_inclusion_proof(index, tree_size);
        if proof.len() != inner + border {
            return Err(VerificationError::WrongProofSize {
                got: proof.len(),
                want: inner + border,
            });
        }
        proof.iter().try_for_each(|node| self.check_hash_size(node))?;

        let seed = self.chain_inner(leaf_hash.to_vec(), &proof[..inner], index);
        Ok(self.chain_border_right(seed, &proof[inner..]))
    }

    /// Verifies that the tree of `size2` leaves with root `root2` extends the tree of `size1` leaves with root `root1`
    ///
    /// An empty first tree is consistent with anything (whatever `root1` is), and equal
    /// sizes need equal roots; both cases require an empty proof.
    ///
    /// # Errors
    ///
    /// - `SizeDecrease`: if `size1 > size2`, whatever the proof,
    /// - `WrongProofSize`: if the proof has the wrong number of nodes,
    /// - `RootMismatch`: if either recomputed root differs from the claimed one.
    pub fn verify_consistency(
        &self,
        size1: u64,
        root1: &[u8],
        size2: u64,
        root2: &[u8],
        proof: &[Vec<u8>],
    ) -> Result<(), VerificationError> {
        if size2 < size1 {
            return Err(VerificationError::SizeDecrease { size1, size2 });
        }
        if size1 == 0 {
            if !proof.is_empty() {
                return Err(VerificationError::WrongProofSize { got: proof.len(), want: 0 });
            }
            return Ok(());
        }
        if size1 == size2 {
            if !proof.is_empty() {
                return Err(VerificationError::WrongProofSize { got: proof.len(), want: 0 });
            }
            return expect_root(root1.to_vec(), root2);
        }
        // 0 < size1 < size2 from here on
        if proof.is_empty() {
            return Err(VerificationError::WrongProofSize { got: 0, want: 1 });
        }
        self.check_hash_size(root1)?;
        self.check_hash_size(root2)?;
        proof.iter().try_for_each(|node| self.check_hash_size(node))?;

        let (inner, border) = decompose_inclusion_proof(size1 - 1, size2);
        let shift = size1.trailing_zeros() as usize;
        let inner = inner - shift;

        // When the old tree is a complete subtree its root is the seed and is not in the proof
        let (seed, start) = if size1 == 1 << shift {
            (root1.to_vec(), 0)
        } else {
            (proof[0].clone(), 1)
        };
        let want = start + inner + border;
        if proof.len() != want {
            return Err(VerificationError::WrongProofSize { got: proof.len(), want });
        }
        let proof = &proof[start..];
        let mask = (size1 - 1) >> shift;

        let hash1 = self.chain_inner_right(seed.clone(), &proof[..inner], mask);
        let hash1 = self.chain_border_right(hash1, &proof[inner..]);
        expect_root(hash1, root1)?;

        let hash2 = self.chain_inner(seed, &proof[..inner], mask);
        let hash2 = self.chain_border_right(hash2, &proof[inner..]);
        expect_root(hash2, root2)
    }

    /// Folds the inner part of a path, placing the seed left or right by the index bits
    fn chain_inner(&self, seed: Vec<u8>, proof: &[Vec<u8>], index: u64) -> Vec<u8> {
        proof.iter().enumerate().fold(seed, |acc, (i, node)| {
            if (index >> i) & 1 == 0 {
                self.hasher.node_hash(&acc, node)
            } else {
                self.hasher.node_hash(node, &acc)
            }
        })
    }

    /// Like `chain_inner`, but only folds nodes that sit to the left of the path
    fn chain_inner_right(&self, seed: Vec<u8>, proof: &[Vec<u8>], index: u64) -> Vec<u8> {
        proof.iter().enumerate().fold(seed, |acc, (i, node)| {
            if (index >> i) & 1 == 1 {
                self.hasher.node_hash(node, &acc)
            } else {
                acc
            }
        })
    }

    /// Folds the border part of a path, where every node is a left sibling
    fn chain_border_right(&self, seed: Vec<u8>, proof: &[Vec<u8>]) -> Vec<u8> {
        proof
            .iter()
            .fold(seed, |acc, node| self.hasher.node_hash(node, &acc))
    }

    fn check_hash_size(&self, hash: &[u8]) -> Result<(), VerificationError> {
        let want = self.hasher.size();
        if hash.len() == want {
            Ok(())
        } else {
            Err(VerificationError::WrongHashSize { got: hash.len(), want })
        }
    }
}

/// Verifies the server's signature over a root
///
/// # Errors
///
/// - `InvalidSignature`: if `verifier` rejects the signature.
pub fn verify_signature<V: SignatureVerifier + ?Sized>(
    verifier: &V,
    public_key: &[u8],
    root: &SignedLogRoot,
) -> Result<(), VerificationError> {
    if verifier.verify(public_key, &root.statement(), &root.signature) {
        Ok(())
    } else {
        Err(VerificationError::InvalidSignature {
            tree_size: root.tree_size,
        })
    }
}

fn expect_root(computed: Vec<u8>, expected: &[u8]) -> Result<(), VerificationError> {
    if computed == expected {
        Ok(())
    } else {
        Err(VerificationError::RootMismatch {
            computed,
            expected: expected.to_vec(),
        })
    }
}

/// Splits the audit path of leaf `index` in a tree of `size` leaves into
/// the part below the point where the path leaves the perfect subtree
/// containing the leaf ("inner") and the part along the right border.
///
/// Requires `index < size`.
fn decompose_inclusion_proof(index: u64, size: u64) -> (usize, usize) {
    let inner = inner_proof_size(index, size);
    let border = (index >> inner).count_ones() as usize;
    (inner, border)
}

fn inner_proof_size(index: u64, size: u64) -> usize {
    (u64::BITS - (index ^ (size - 1)).leading_zeros()) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Rfc6962Hasher;
    use crate::signature::{sign_root, Ed25519Verifier};
    use crate::tree::MerkleTree;
    use ed25519_dalek::SigningKey;

    const MAX_SIZE: u64 = 17;

    fn verifier() -> MerkleVerifier<Rfc6962Hasher> {
        MerkleVerifier::new(Rfc6962Hasher)
    }

    fn create_test_tree(size: u64) -> MerkleTree {
        let mut tree = MerkleTree::default();
        for i in 0..size {
            tree.push_value(format!("leaf-{i}").as_bytes());
        }
        tree
    }

    fn flip_bit(bytes: &mut [u8], bit: usize) {
        bytes[bit / 8] ^= 1 << (bit % 8);
    }

    #[test]
    fn test_valid_inclusion_proofs() {
        let tree = create_test_tree(MAX_SIZE);
        let verifier = verifier();
        for size in 1..=MAX_SIZE {
            let root = tree.root_at(size).expect("historical size");
            for index in 0..size {
                let leaf = tree.leaf_hash(index).expect("leaf exists");
                let proof = tree.prove_inclusion_at(index, size).expect("Should create proof");
                verifier
                    .verify_inclusion(leaf, index, size, &root, &proof)
                    .unwrap_or_else(|e| panic!("index {index} size {size}: {e}"));
            }
        }
    }

    #[test]
    fn test_inclusion_fails_on_any_bit_flip() {
        let tree = create_test_tree(7);
        let verifier = verifier();
        let size = 7;
        let root = tree.root_at(size).expect("size 7");
        for index in 0..size {
            let leaf = tree.leaf_hash(index).expect("leaf exists").to_vec();
            let proof = tree.prove_inclusion_at(index, size).expect("Should create proof");

            for bit in 0..leaf.len() * 8 {
                let mut bad_leaf = leaf.clone();
                flip_bit(&mut bad_leaf, bit);
                assert!(verifier.verify_inclusion(&bad_leaf, index, size, &root, &proof).is_err());

                let mut bad_root = root.clone();
                flip_bit(&mut bad_root, bit);
                assert!(verifier.verify_inclusion(&leaf, index, size, &bad_root, &proof).is_err());

                for node in 0..proof.len() {
                    let mut bad_proof = proof.clone();
                    flip_bit(&mut bad_proof[node], bit);
                    assert!(verifier.verify_inclusion(&leaf, index, size, &root, &bad_proof).is_err());
                }
            }
        }
    }

    #[test]
    fn test_inclusion_rejects_wrong_shapes() {
        let tree = create_test_tree(5);
        let verifier = verifier();
        let root = tree.root_at(5).expect("size 5");
        let leaf = tree.leaf_hash(1).expect("leaf exists");
        let proof = tree.prove_inclusion_at(1, 5).expect("Should create proof");

        // Right proof, wrong position
        assert!(verifier.verify_inclusion(leaf, 0, 5, &root, &proof).is_err());
        // Out of range index
        assert_eq!(
            verifier.verify_inclusion(leaf, 5, 5, &root, &proof),
            Err(VerificationError::IndexOutOfRange { index: 5, tree_size: 5 })
        );
        assert!(verifier.verify_inclusion(leaf, 0, 0, &root, &[]).is_err());
        // Truncated and extended proofs
        assert!(matches!(
            verifier.verify_inclusion(leaf, 1, 5, &root, &proof[..proof.len() - 1]),
            Err(VerificationError::WrongProofSize { .. })
        ));
        let mut extended = proof.clone();
        extended.push(root.clone());
        assert!(matches!(
            verifier.verify_inclusion(leaf, 1, 5, &root, &extended),
            Err(VerificationError::WrongProofSize { .. })
        ));
        // Proof from a different tree size
        let old_proof = tree.prove_inclusion_at(1, 4).expect("Should create proof");
        assert!(verifier.verify_inclusion(leaf, 1, 5, &root, &old_proof).is_err());
        // Short node
        let mut short = proof.clone();
        short[0].pop();
        assert!(matches!(
            verifier.verify_inclusion(leaf, 1, 5, &root, &short),
            Err(VerificationError::WrongHashSize { got: 31, want: 32 })
        ));
    }

    #[test]
    fn test_single_leaf_tree() {
        let tree = create_test_tree(1);
        let leaf = tree.leaf_hash(0).expect("leaf exists");
        verifier()
            .verify_inclusion(leaf, 0, 1, &tree.root(), &[])
            .expect("leaf hash is the root of a one-leaf tree");
    }

    #[test]
    fn test_valid_consistency_proofs() {
        let tree = create_test_tree(MAX_SIZE);
        let verifier = verifier();
        for size2 in 0..=MAX_SIZE {
            let root2 = tree.root_at(size2).expect("historical size");
            for size1 in 0..=size2 {
                let root1 = tree.root_at(size1).expect("historical size");
                let proof = tree
                    .prove_consistency_between(size1, size2)
                    .expect("Should create proof");
                verifier
                    .verify_consistency(size1, &root1, size2, &root2, &proof)
                    .unwrap_or_else(|e| panic!("{size1} -> {size2}: {e}"));
            }
        }
    }

    #[test]
    fn test_consistency_fails_on_any_bit_flip() {
        let tree = create_test_tree(11);
        let verifier = verifier();
        for (size1, size2) in [(1, 2), (3, 7), (4, 11), (6, 8), (5, 11), (10, 11)] {
            let root1 = tree.root_at(size1).expect("historical size");
            let root2 = tree.root_at(size2).expect("historical size");
            let proof = tree
                .prove_consistency_between(size1, size2)
                .expect("Should create proof");
            for bit in 0..root1.len() * 8 {
                let mut bad = root1.clone();
                flip_bit(&mut bad, bit);
                assert!(verifier.verify_consistency(size1, &bad, size2, &root2, &proof).is_err());

                let mut bad = root2.clone();
                flip_bit(&mut bad, bit);
                assert!(verifier.verify_consistency(size1, &root1, size2, &bad, &proof).is_err());

                for node in 0..proof.len() {
                    let mut bad_proof = proof.clone();
                    flip_bit(&mut bad_proof[node], bit);
                    assert!(
                        verifier
                            .verify_consistency(size1, &root1, size2, &root2, &bad_proof)
                            .is_err(),
                        "{size1} -> {size2}: flipped bit {bit} of node {node} verified"
                    );
                }
            }
        }
    }

    #[test]
    fn test_consistency_rejects_shrinking_tree() {
        let tree = create_test_tree(8);
        let verifier = verifier();
        let root3 = tree.root_at(3).expect("size 3");
        let root8 = tree.root_at(8).expect("size 8");
        let forward = tree.prove_consistency_between(3, 8).expect("Should create proof");

        for proof in [vec![], forward.clone(), vec![root3.clone()]] {
            assert_eq!(
                verifier.verify_consistency(8, &root8, 3, &root3, &proof),
                Err(VerificationError::SizeDecrease { size1: 8, size2: 3 })
            );
        }
        assert!(verifier.verify_consistency(1, &root3, 0, &root3, &[]).is_err());
    }

    #[test]
    fn test_consistency_from_empty_tree() {
        let tree = create_test_tree(6);
        let verifier = verifier();
        for size2 in 0..=6 {
            let root2 = tree.root_at(size2).expect("historical size");
            verifier
                .verify_consistency(0, &[1, 2, 3], size2, &root2, &[])
                .expect("empty tree is consistent with everything");
        }
        assert!(matches!(
            verifier.verify_consistency(0, &[], 6, &tree.root(), &[tree.root()]),
            Err(VerificationError::WrongProofSize { got: 1, want: 0 })
        ));
    }

    #[test]
    fn test_consistency_same_size() {
        let tree = create_test_tree(4);
        let verifier = verifier();
        let root = tree.root();
        verifier
            .verify_consistency(4, &root, 4, &root, &[])
            .expect("same root should be consistent");

        let other = tree.root_at(3).expect("size 3");
        assert!(matches!(
            verifier.verify_consistency(4, &root, 4, &other, &[]),
            Err(VerificationError::RootMismatch { .. })
        ));
        assert!(matches!(
            verifier.verify_consistency(4, &root, 4, &root, &[root.clone()]),
            Err(VerificationError::WrongProofSize { got: 1, want: 0 })
        ));
    }

    #[test]
    fn test_consistency_detects_rewritten_history() {
        let honest = create_test_tree(6);
        let mut forked = MerkleTree::default();
        for i in 0..6u64 {
            let value = if i == 1 { "rewritten".to_string() } else { format!("leaf-{i}") };
            forked.push_value(value.as_bytes());
        }
        let verifier = verifier();
        let root3 = honest.root_at(3).expect("size 3");
        let forked_root = forked.root();
        let proof = forked.prove_consistency_between(3, 6).expect("Should create proof");

        assert!(verifier
            .verify_consistency(3, &root3, 6, &forked_root, &proof)
            .is_err());
        assert!(verifier
            .verify_consistency(3, &root3, 6, &forked_root, &[])
            .is_err());
    }

    #[test]
    fn test_verify_signature() {
        let key = SigningKey::from_bytes(&[3; 32]);
        let public = key.verifying_key().to_bytes();
        let mut root = sign_root(&key, 4, vec![5; 32], 10);
        verify_signature(&Ed25519Verifier, &public, &root).expect("signature should verify");

        root.root_hash[0] ^= 1;
        assert_eq!(
            verify_signature(&Ed25519Verifier, &public, &root),
            Err(VerificationError::InvalidSignature { tree_size: 4 })
        );
    }
}
