//! bcrypt hashing on the blocking pool

use crate::http::error::ApiError;

/// Work factor for new hashes.
pub const BCRYPT_COST: u32 = 12;

pub async fn hash(password: String) -> Result<String, ApiError> {
    hash_with_cost(password, BCRYPT_COST).await
}

pub(crate) async fn hash_with_cost(password: String, cost: u32) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ApiError::internal(format!("hash task failed: {}", e)))?
        .map_err(|e| ApiError::internal(format!("bcrypt hash failed: {}", e)))
}

/// `false` for a wrong password and for a malformed stored hash alike.
pub async fn verify(password: String, hash: String) -> Result<bool, ApiError> {
    let outcome = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ApiError::internal(format!("verify task failed: {}", e)))?;
    match outcome {
        Ok(matches) => Ok(matches),
        Err(e) => {
            tracing::debug!("bcrypt verify failed: {}", e);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        let hash = hash_with_cost("pass1234".into(), 4).await.unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify("pass1234".into(), hash.clone()).await.unwrap());
        assert!(!verify("pass12345".into(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn garbage_hash_never_matches() {
        assert!(!verify("pass1234".into(), "not-a-hash".into()).await.unwrap());
    }
}
