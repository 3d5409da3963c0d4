//! Generic RPC plus the RPC-backed authorization helpers

use serde_json::{json, Value};
use uuid::Uuid;

use super::{failed, Client};
use crate::errors::{ClientError, ClientResult};
use crate::observability::CallArgs;
use crate::operation::Operation;

/// Stored procedure narrowing row visibility to one domain
const SET_CURRENT_DOMAIN_FN: &str = "set_current_domain";
const GET_USER_ROLES_FN: &str = "get_user_roles";
const CHECK_PERMISSION_FN: &str = "check_permission";

impl Client {
    /// Call a stored procedure with named arguments; returns the raw payload
    ///
    /// `params` must be an object or `null`. An empty response body
    /// decodes to `Value::Null`.
    pub async fn rpc(&self, function: &str, params: Value) -> ClientResult<Value> {
        let args = CallArgs::new()
            .with("function", function)
            .with("params", &params);

        self.observer
            .observe(Operation::Rpc, args, async {
                if function.trim().is_empty() {
                    return Err(ClientError::validation("Function name cannot be empty"));
                }
                let params = match params {
                    Value::Null => json!({}),
                    Value::Object(_) => params,
                    _ => return Err(ClientError::validation("RPC params must be an object")),
                };
                self.conn
                    .send_rpc(function, &params)
                    .await
                    .map_err(failed(Operation::Rpc))
            })
            .await
    }

    /// Scope subsequent row access to a domain; `None` clears the scope
    pub async fn set_current_domain(&self, domain_id: Option<&str>) -> ClientResult<()> {
        let args = CallArgs::new().with("domain_id", domain_id.unwrap_or("none"));

        self.observer
            .observe(Operation::SetCurrentDomain, args, async {
                let params = json!({ "domain_id": domain_id });
                self.conn
                    .send_rpc(SET_CURRENT_DOMAIN_FN, &params)
                    .await
                    .map_err(failed(Operation::SetCurrentDomain))?;
                Ok(())
            })
            .await
    }

    /// Role names of a user (the signed-in user when `None`)
    pub async fn get_user_roles(&self, user_id: Option<Uuid>) -> ClientResult<Vec<String>> {
        let args = CallArgs::new().with(
            "user_id",
            user_id.map(|id| id.to_string()).unwrap_or_else(|| "current".into()),
        );

        self.observer
            .observe(Operation::GetUserRoles, args, async {
                let user_id = user_id
                    .or_else(|| self.conn.session().get().and_then(|s| s.user_id()))
                    .ok_or_else(|| {
                        ClientError::authorization("Failed to get user roles: no user to look up")
                    })?;

                let payload = self
                    .conn
                    .send_rpc(GET_USER_ROLES_FN, &json!({ "p_user_id": user_id }))
                    .await
                    .map_err(failed(Operation::GetUserRoles))?;
                role_names(&payload).ok_or_else(|| {
                    ClientError::authorization(format!(
                        "Failed to get user roles: unexpected response {}",
                        payload
                    ))
                })
            })
            .await
    }

    /// Whether the current identity holds `permission`
    pub async fn check_permission(&self, permission: &str) -> ClientResult<bool> {
        let args = CallArgs::new().with("permission", permission);

        self.observer
            .observe(Operation::CheckPermission, args, async {
                if permission.trim().is_empty() {
                    return Err(ClientError::authorization("Permission name cannot be empty"));
                }
                let payload = self
                    .conn
                    .send_rpc(CHECK_PERMISSION_FN, &json!({ "p_permission": permission }))
                    .await
                    .map_err(failed(Operation::CheckPermission))?;
                payload.as_bool().ok_or_else(|| {
                    ClientError::authorization(format!(
                        "Failed to check permission: unexpected response {}",
                        payload
                    ))
                })
            })
            .await
    }
}

/// Accepts `["admin"]` or `[{"role": "admin"}]` / `[{"name": "admin"}]`
fn role_names(payload: &Value) -> Option<Vec<String>> {
    payload
        .as_array()?
        .iter()
        .map(|item| match item {
            Value::String(role) => Some(role.clone()),
            Value::Object(row) => row
                .get("role")
                .or_else(|| row.get("role_name"))
                .or_else(|| row.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_names_shapes() {
        assert_eq!(role_names(&json!(["admin", "editor"])).unwrap(), vec!["admin", "editor"]);
        assert_eq!(
            role_names(&json!([{"role": "admin"}, {"name": "viewer"}])).unwrap(),
            vec!["admin", "viewer"]
        );
        assert!(role_names(&json!({"role": "admin"})).is_none());
        assert!(role_names(&json!([1])).is_none());
    }
}
