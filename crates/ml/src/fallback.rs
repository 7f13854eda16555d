use crate::EmbeddingModel;

/// Feature-hashing embedder. No trained weights, so it is always
/// available; used to place narratives and training examples in the same
/// vector space for the centroid model.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(32) }
    }
}

impl EmbeddingModel for HashEmbedder {
    fn model_name(&self) -> &'static str {
        "hash-embedder"
    }

    fn embed(&self, tokens: &[String]) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dims];

        for token in tokens {
            let hash = fnv1a(token.as_bytes());
            let index = (hash as usize) % self.dims;
            let sign = if (hash & 1) == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        l2_normalize(&mut vector);
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

pub(crate) fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in values.iter_mut() {
            *value /= norm;
        }
    }
}
