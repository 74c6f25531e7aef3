use crate::hasher::{HashProvider, Rfc6962Hasher, SHA256_SIZE};
use ct_merkle::mem_backed_tree::MemoryBackedTree;
use sha2::Sha256;
use std::borrow::Cow;
use std::collections::HashMap;

/// Error type for proof operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofError {
    /// The requested leaf hash was not found in the tree
    #[error("leaf not found")]
    LeafNotFound,
    /// The requested root hash was not found in the tree's history
    #[error("root not found")]
    RootNotFound,
    /// The leaf exists but wasn't present at the specified tree size
    #[error("leaf {index} is not present in a tree of size {tree_size}")]
    LeafNotPresentAtTree { index: u64, tree_size: u64 },
    /// The requested tree size is larger than the tree
    #[error("tree size {requested} exceeds current size {current}")]
    SizeTooLarge { requested: u64, current: u64 },
    /// The old tree must not be larger than the new tree
    #[error("old size {old_size} is larger than new size {new_size}")]
    InvalidRootOrder { old_size: u64, new_size: u64 },
}

/// A merkle tree implementation based on Certificate Transparency that keeps its
/// root history and can prove inclusion and consistency at any historical size.
///
/// This is the tree a log server keeps; the client never builds one, it only
/// checks proofs produced from it.
pub struct MerkleTree {
    /// The underlying CT merkle tree over raw leaf values
    tree: MemoryBackedTree<Sha256, Vec<u8>>,
    /// RFC 6962 leaf hashes in log order
    leaf_hashes: Vec<Vec<u8>>,
    /// Maps leaf hash to its first position (index) in the tree
    leaf_hash_to_index: HashMap<Vec<u8>, u64>,
    /// Maps root hash to the tree size that produced it
    root_hash_to_size: HashMap<Vec<u8>, u64>,
}

impl MerkleTree {
    /// Creates a new empty merkle tree
    #[must_use]
    pub fn new() -> Self {
        let tree = MemoryBackedTree::new();
        let mut root_hash_to_size = HashMap::new();
        root_hash_to_size.insert(tree.root().as_bytes().to_vec(), 0);
        Self {
            tree,
            leaf_hashes: Vec::new(),
            leaf_hash_to_index: HashMap::new(),
            root_hash_to_size,
        }
    }

    /// Appends a leaf value, records the resulting root and returns the leaf's index
    pub fn push_value(&mut self, leaf: &[u8]) -> u64 {
        let idx = self.len();
        let leaf_hash = Rfc6962Hasher.leaf_hash(leaf);
        self.leaf_hash_to_index.entry(leaf_hash.clone()).or_insert(idx);
        self.leaf_hashes.push(leaf_hash);
        self.tree.push(leaf.to_vec());
        // every size gets a checkpoint, since any of them may have been published
        let root = self.root();
        self.root_hash_to_size.insert(root, self.len());
        idx
    }

    /// Gets the current number of leaves in the tree
    #[must_use]
    pub fn len(&self) -> u64 {
        self.tree.len()
    }

    /// Returns true if the tree is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Gets the current root hash
    #[must_use]
    pub fn root(&self) -> Vec<u8> {
        self.tree.root().as_bytes().to_vec()
    }

    /// Gets the root hash the tree had when it held `size` leaves
    ///
    /// # Errors
    ///
    /// - `ProofError::SizeTooLarge`: if the tree never had that many leaves
    pub fn root_at(&self, size: u64) -> Result<Vec<u8>, ProofError> {
        Ok(self.rewind(size)?.root().as_bytes().to_vec())
    }

    /// All leaf values in log order
    #[must_use]
    pub fn items(&self) -> &[Vec<u8>] {
        self.tree.items()
    }

    /// Gets the leaf value stored at `index`
    #[must_use]
    pub fn value(&self, index: u64) -> Option<&[u8]> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.tree.get(i))
            .map(Vec::as_slice)
    }

    /// Gets the index for a given leaf hash
    #[must_use]
    pub fn get_index(&self, hash: &[u8]) -> Option<u64> {
        self.leaf_hash_to_index.get(hash).copied()
    }

    /// Gets the tree size for a given root hash
    #[must_use]
    pub fn get_size_for_root(&self, root: &[u8]) -> Option<u64> {
        self.root_hash_to_size.get(root).copied()
    }

    /// Gets the leaf hash stored at `index`
    #[must_use]
    pub fn leaf_hash(&self, index: u64) -> Option<&[u8]> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.leaf_hashes.get(i))
            .map(Vec::as_slice)
    }

    /// Generates the audit path for the leaf at `index` in the tree of `tree_size` leaves
    ///
    /// # Errors
    ///
    /// - `ProofError::SizeTooLarge`: if `tree_size` exceeds the tree,
    /// - `ProofError::LeafNotPresentAtTree`: if `index >= tree_size`.
    pub fn prove_inclusion_at(&self, index: u64, tree_size: u64) -> Result<Vec<Vec<u8>>, ProofError> {
        let tree = self.rewind(tree_size)?;
        if index >= tree_size {
            return Err(ProofError::LeafNotPresentAtTree { index, tree_size });
        }
        // index < tree_size <= len, so it fits
        let idx = usize::try_from(index).map_err(|_| self.too_large(index))?;
        Ok(split_nodes(tree.prove_inclusion(idx).as_bytes()))
    }

    /// Generates an inclusion proof for a leaf hash against the tree at `tree_size`
    ///
    /// # Errors
    ///
    /// - `ProofError::LeafNotFound`: if the leaf hash does not exist in the tree,
    /// - `ProofError::LeafNotPresentAtTree`: if the leaf was added after `tree_size`.
    pub fn prove_inclusion_by_hash(
        &self,
        leaf_hash: &[u8],
        tree_size: u64,
    ) -> Result<(u64, Vec<Vec<u8>>), ProofError> {
        let index = self.get_index(leaf_hash).ok_or(ProofError::LeafNotFound)?;
        let path = self.prove_inclusion_at(index, tree_size)?;
        Ok((index, path))
    }

    /// Generates an inclusion proof for a leaf hash at a historical root state
    ///
    /// # Errors
    ///
    /// - `ProofError::RootNotFound`: if the root is not in the tree's history,
    /// - see [`MerkleTree::prove_inclusion_by_hash`].
    pub fn prove_inclusion_at_root(
        &self,
        leaf_hash: &[u8],
        root: &[u8],
    ) -> Result<(u64, Vec<Vec<u8>>), ProofError> {
        let size = self.get_size_for_root(root).ok_or(ProofError::RootNotFound)?;
        self.prove_inclusion_by_hash(leaf_hash, size)
    }

    /// Generates a consistency proof between the trees of `old_size` and `new_size` leaves
    ///
    /// Equal sizes and an empty old tree produce an empty proof.
    ///
    /// # Errors
    ///
    /// - `ProofError::InvalidRootOrder`: if `old_size > new_size`,
    /// - `ProofError::SizeTooLarge`: if `new_size` exceeds the tree.
    pub fn prove_consistency_between(
        &self,
        old_size: u64,
        new_size: u64,
    ) -> Result<Vec<Vec<u8>>, ProofError> {
        if old_size > new_size {
            return Err(ProofError::InvalidRootOrder { old_size, new_size });
        }
        let new_tree = self.rewind(new_size)?;
        if old_size == 0 || old_size == new_size {
            return Ok(Vec::new());
        }
        let num_additions = usize::try_from(new_size - old_size).map_err(|_| self.too_large(new_size))?;
        Ok(split_nodes(new_tree.prove_consistency(num_additions).as_bytes()))
    }

    /// Returns the tree as it was when it held `size` leaves
    ///
    /// # Errors
    ///
    /// - `ProofError::SizeTooLarge`: if the tree never had that many leaves
    fn rewind(&self, size: u64) -> Result<Cow<'_, MemoryBackedTree<Sha256, Vec<u8>>>, ProofError> {
        if size == self.len() {
            return Ok(Cow::Borrowed(&self.tree));
        }
        let prefix = usize::try_from(size)
            .ok()
            .and_then(|n| self.tree.items().get(..n))
            .ok_or_else(|| self.too_large(size))?;

        let mut historical_tree = MemoryBackedTree::new();
        for leaf in prefix {
            historical_tree.push(leaf.clone());
        }
        Ok(Cow::Owned(historical_tree))
    }

    fn too_large(&self, requested: u64) -> ProofError {
        ProofError::SizeTooLarge {
            requested,
            current: self.len(),
        }
    }
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a ct-merkle proof into its concatenated node hashes
fn split_nodes(bytes: &[u8]) -> Vec<Vec<u8>> {
    bytes.chunks(SHA256_SIZE).map(<[u8]>::to_vec).collect()
}
