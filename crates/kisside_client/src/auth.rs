use serde::{Deserialize, Serialize};
use serde_json::json;

use kisside_remote::{local_code, Rpc, RpcError};

use crate::fs::deserialize_result;

/// A signed-in session. The token authorizes every subsequent fs call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub authtoken: String,
    #[serde(default)]
    pub admin: bool,
}

/// Authentication surface of the kisside service.
#[derive(Clone)]
pub struct AuthService {
    rpc: Rpc,
}

impl AuthService {
    pub(crate) fn new(rpc: Rpc) -> Self {
        Self { rpc }
    }

    pub async fn signin(&self, user: &str, password: &str) -> Result<Session, RpcError> {
        let result = self
            .rpc
            .call("signin", vec![json!(user), json!(password)])
            .await?;
        deserialize_result("signin", result)
    }

    pub async fn signout(&self, authtoken: &str) -> Result<(), RpcError> {
        self.rpc.call("signout", vec![json!(authtoken)]).await?;
        Ok(())
    }

    /// Whether a token is still valid. The server answers with a bare
    /// boolean; anything else is treated as an undecodable reply.
    pub async fn checkauth(&self, authtoken: &str) -> Result<bool, RpcError> {
        let result = self.rpc.call("checkauth", vec![json!(authtoken)]).await?;
        result.as_bool().ok_or_else(|| {
            RpcError::local(
                local_code::NO_DATA,
                format!("checkauth returned a non-boolean result: {result}"),
            )
        })
    }
}
