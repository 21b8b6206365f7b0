use sqlx::{FromRow, PgPool};
use tracing::warn;

pub mod cipher;

pub use cipher::FieldCipher;

/// Projection of the user record owning a session token.
///
/// Fields arriving ciphered are decrypted lazily by
/// [`decrypt_user_fields`]; until then they hold the stored value.
#[derive(Debug, Clone)]
pub struct ResolvedUser {
    pub id: String,
    pub cargo: Option<String>,
    pub rol: Option<String>,
    pub estado: Option<String>,
    pub nombre: Option<String>,
    pub apellido: Option<String>,
    pub mail: Option<String>,
    pub empresa: Option<String>,
}

/// A session token joined to its owning user, when one matches.
#[derive(Debug, Clone)]
pub struct ResolvedToken {
    pub token: String,
    pub user_id: Option<String>,
    pub usuario: Option<ResolvedUser>,
}

#[derive(Debug, FromRow)]
struct ResolvedTokenRow {
    token: String,
    user_id: Option<String>,
    usuario_id: Option<String>,
    cargo: Option<String>,
    rol: Option<String>,
    estado: Option<String>,
    nombre: Option<String>,
    apellido: Option<String>,
    mail: Option<String>,
    empresa: Option<String>,
}

#[derive(Debug, FromRow)]
struct TokenOnlyRow {
    token: String,
    user_id: Option<String>,
}

/// Whether a stored user identifier is usable as a join key: non-empty
/// and a 24-character hexadecimal string (legacy id format).
pub fn is_user_join_key(user_id: &str) -> bool {
    user_id.len() == 24 && user_id.chars().all(|c| c.is_ascii_hexdigit())
}

/// Resolve a bearer token against the control database.
///
/// A single query matches the token exactly and left-joins `usuarios`,
/// guarding the join on the stored user id being a valid join key; the
/// token row survives with no `usuario` when nothing matches. A query
/// failure degrades to a token-only lookup, and a failure of the
/// fallback itself is logged and swallowed.
pub async fn resolve_token(pool: &PgPool, token: &str) -> Option<ResolvedToken> {
    let joined = sqlx::query_as::<_, ResolvedTokenRow>(
        r#"
        SELECT t.token, t.user_id,
               u.id AS usuario_id,
               u.cargo, u.rol, u.estado, u.nombre, u.apellido, u.mail, u.empresa
        FROM tokens t
        LEFT JOIN usuarios u
          ON t.user_id IS NOT NULL
         AND t.user_id <> ''
         AND t.user_id ~* '^[0-9a-f]{24}$'
         AND u.id = t.user_id
        WHERE t.token = $1
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await;

    match joined {
        Ok(row) => row.map(|r| {
            let usuario = r.usuario_id.map(|id| ResolvedUser {
                id,
                cargo: r.cargo,
                rol: r.rol,
                estado: r.estado,
                nombre: r.nombre,
                apellido: r.apellido,
                mail: r.mail,
                empresa: r.empresa,
            });
            ResolvedToken {
                token: r.token,
                user_id: r.user_id,
                usuario,
            }
        }),
        Err(e) => {
            warn!("token join query failed, falling back to token-only lookup: {}", e);
            fallback_lookup(pool, token).await
        }
    }
}

/// Degraded lookup: the token row alone, no user join.
async fn fallback_lookup(pool: &PgPool, token: &str) -> Option<ResolvedToken> {
    match sqlx::query_as::<_, TokenOnlyRow>("SELECT token, user_id FROM tokens WHERE token = $1")
        .bind(token)
        .fetch_optional(pool)
        .await
    {
        Ok(row) => row.map(|r| ResolvedToken {
            token: r.token,
            user_id: r.user_id,
            usuario: None,
        }),
        Err(e) => {
            warn!("token fallback lookup failed: {}", e);
            None
        }
    }
}

/// Decrypt the fixed list of sensitive user fields in place.
///
/// A field is only touched when its stored value looks ciphered;
/// per-field failures are logged and leave the ciphered value as-is.
pub fn decrypt_user_fields(user: &mut ResolvedUser, cipher: &FieldCipher) {
    decrypt_field(cipher, "nombre", &mut user.nombre);
    decrypt_field(cipher, "apellido", &mut user.apellido);
    decrypt_field(cipher, "mail", &mut user.mail);
    decrypt_field(cipher, "cargo", &mut user.cargo);
    decrypt_field(cipher, "empresa", &mut user.empresa);
    decrypt_field(cipher, "estado", &mut user.estado);
    decrypt_field(cipher, "rol", &mut user.rol);
}

fn decrypt_field(cipher: &FieldCipher, name: &str, value: &mut Option<String>) {
    if let Some(stored) = value {
        if !cipher.is_ciphered(stored) {
            return;
        }
        match cipher.decrypt(stored) {
            Ok(plain) => *value = Some(plain),
            Err(e) => warn!("failed to decrypt user field {}: {}", name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> ResolvedUser {
        ResolvedUser {
            id: "64f0c2a9e4b0a1b2c3d4e5f6".to_string(),
            cargo: None,
            rol: None,
            estado: None,
            nombre: None,
            apellido: None,
            mail: None,
            empresa: None,
        }
    }

    #[test]
    fn join_key_requires_24_hex_chars() {
        assert!(is_user_join_key("64f0c2a9e4b0a1b2c3d4e5f6"));
        assert!(is_user_join_key("64F0C2A9E4B0A1B2C3D4E5F6"));
        assert!(!is_user_join_key(""));
        assert!(!is_user_join_key("64f0c2a9e4b0a1b2c3d4e5"));
        assert!(!is_user_join_key("64f0c2a9e4b0a1b2c3d4e5f6aa"));
        assert!(!is_user_join_key("64f0c2a9e4b0a1b2c3d4e5zz"));
    }

    #[test]
    fn decrypts_ciphered_fields() {
        let cipher = FieldCipher::new("secret");
        let mut user = sample_user();
        user.nombre = Some(cipher.encrypt("Juana").unwrap());
        user.mail = Some("plain@example.com".to_string());

        decrypt_user_fields(&mut user, &cipher);

        assert_eq!(user.nombre.as_deref(), Some("Juana"));
        assert_eq!(user.mail.as_deref(), Some("plain@example.com"));
    }

    #[test]
    fn decryption_failure_leaves_raw_value() {
        let other = FieldCipher::new("other-secret");
        let cipher = FieldCipher::new("secret");

        let stored = other.encrypt("Juana").unwrap();
        let mut user = sample_user();
        user.nombre = Some(stored.clone());

        decrypt_user_fields(&mut user, &cipher);

        assert_eq!(user.nombre.as_deref(), Some(stored.as_str()));
    }
}
