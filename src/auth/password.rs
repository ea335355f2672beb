use crate::backend::BackendError;

/// Hash off the async executor; bcrypt is deliberately slow
pub async fn hash_password(password: &str, cost: u32) -> Result<String, BackendError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| BackendError::Unavailable(format!("hashing task failed: {}", e)))?
        .map_err(BackendError::from)
}

pub async fn verify_password(password: &str, hash: &str) -> Result<bool, BackendError> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| BackendError::Unavailable(format!("hashing task failed: {}", e)))?
        .map_err(BackendError::from)
}
