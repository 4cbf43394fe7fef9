//! SSH keypair

use infraflow_cloud::{Keypair, KeypairProvider, Result, ignore_not_found};

/// Converge the keypair `name` to `public_key`.
///
/// Without a public key any existing keypair of that name is removed. A
/// keypair with a different key is replaced, as keypairs cannot be updated.
pub async fn ensure_keypair(
    provider: &dyn KeypairProvider,
    name: &str,
    public_key: Option<&str>,
) -> Result<Option<Keypair>> {
    let existing = ignore_not_found(provider.get_keypair(name).await)?;

    let Some(public_key) = public_key.map(str::trim).filter(|k| !k.is_empty()) else {
        if existing.is_some() {
            delete_keypair(provider, name).await?;
        }
        return Ok(None);
    };

    match existing {
        Some(keypair) if keypair.public_key.trim() == public_key => {
            tracing::debug!("Keypair is up to date: {}", name);
            return Ok(Some(keypair));
        }
        Some(_) => {
            tracing::info!("Replacing keypair with a different public key: {}", name);
            delete_keypair(provider, name).await?;
        }
        None => tracing::info!("Creating keypair: {}", name),
    }

    provider.create_keypair(name, public_key).await.map(Some)
}

/// Delete a keypair; returns false when it was already gone
pub async fn delete_keypair(provider: &dyn KeypairProvider, name: &str) -> Result<bool> {
    match ignore_not_found(provider.delete_keypair(name).await)? {
        Some(()) => {
            tracing::info!("Deleted keypair: {}", name);
            Ok(true)
        }
        None => {
            tracing::debug!("Keypair not found, nothing to delete: {}", name);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infraflow_cloud_iaas::{InMemoryIaas, IaasProvider};
    use std::sync::Arc;

    const KEY_A: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIA user@a";
    const KEY_B: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIB user@b";

    #[tokio::test]
    async fn test_keypair_lifecycle() {
        let api = Arc::new(InMemoryIaas::new());
        let provider = IaasProvider::new(api.clone());

        let created = ensure_keypair(&provider, "shoot", Some(KEY_A)).await.unwrap();
        assert_eq!(created.unwrap().public_key, KEY_A);
        api.clear_calls();

        ensure_keypair(&provider, "shoot", Some(&format!("{}\n", KEY_A)))
            .await
            .unwrap();
        assert!(api.mutating_calls().is_empty());

        ensure_keypair(&provider, "shoot", Some(KEY_B)).await.unwrap();
        assert_eq!(
            api.mutating_calls(),
            vec!["delete_keypair shoot", "create_keypair shoot"]
        );
        assert_eq!(api.keypairs()[0].public_key, KEY_B);

        assert!(ensure_keypair(&provider, "shoot", None).await.unwrap().is_none());
        assert!(api.keypairs().is_empty());
        assert!(!delete_keypair(&provider, "shoot").await.unwrap());
    }
}
