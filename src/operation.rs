//! Unified Operation Model
//!
//! Every public facade call is named by one `Operation`. The name drives
//! call logging and the domain drives error classification.

use std::fmt;

/// Which backend subsystem an operation talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Client construction
    Connection,
    /// Table rows and generic RPC
    Query,
    /// Login, signup, session lifecycle
    Auth,
    /// Domain scoping, roles, permissions
    Authorization,
    /// Buckets and objects
    Storage,
    /// Push channel subscriptions
    Realtime,
}

/// All facade operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,

    // Rows
    Select,
    SelectOne,
    Insert,
    Update,
    Delete,
    Rpc,

    // Auth
    Login,
    LoginWithProvider,
    Logout,
    Signup,
    ResetPassword,
    GetUser,
    RefreshSession,
    UpdateUser,
    SetSession,
    VerifyOtp,

    // Authorization
    SetCurrentDomain,
    GetUserRoles,
    CheckPermission,

    // Storage
    UploadFile,
    DownloadFile,
    DeleteFiles,
    ListFiles,
    GetPublicUrl,
    CreateBucket,
    GetBucket,
    ListBuckets,
    DeleteBucket,
    EmptyBucket,

    // Realtime
    SubscribeToTable,
    Unsubscribe,
}

impl Operation {
    /// Operation name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Select => "select",
            Self::SelectOne => "select_one",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Rpc => "rpc",
            Self::Login => "login",
            Self::LoginWithProvider => "login_with_provider",
            Self::Logout => "logout",
            Self::Signup => "signup",
            Self::ResetPassword => "reset_password",
            Self::GetUser => "get_user",
            Self::RefreshSession => "refresh_session",
            Self::UpdateUser => "update_user",
            Self::SetSession => "set_session",
            Self::VerifyOtp => "verify_otp",
            Self::SetCurrentDomain => "set_current_domain",
            Self::GetUserRoles => "get_user_roles",
            Self::CheckPermission => "check_permission",
            Self::UploadFile => "upload_file",
            Self::DownloadFile => "download_file",
            Self::DeleteFiles => "delete_files",
            Self::ListFiles => "list_files",
            Self::GetPublicUrl => "get_public_url",
            Self::CreateBucket => "create_bucket",
            Self::GetBucket => "get_bucket",
            Self::ListBuckets => "list_buckets",
            Self::DeleteBucket => "delete_bucket",
            Self::EmptyBucket => "empty_bucket",
            Self::SubscribeToTable => "subscribe_to_table",
            Self::Unsubscribe => "unsubscribe",
        }
    }

    /// Human phrase used in error messages ("Failed to {action}")
    pub fn action(&self) -> &'static str {
        match self {
            Self::Connect => "initialize client",
            Self::Select => "select from table",
            Self::SelectOne => "fetch single record",
            Self::Insert => "insert into table",
            Self::Update => "update table",
            Self::Delete => "delete from table",
            Self::Rpc => "call remote procedure",
            Self::Login => "login",
            Self::LoginWithProvider => "start provider login",
            Self::Logout => "logout",
            Self::Signup => "signup",
            Self::ResetPassword => "reset password",
            Self::GetUser => "get user",
            Self::RefreshSession => "refresh session",
            Self::UpdateUser => "update user",
            Self::SetSession => "set session",
            Self::VerifyOtp => "verify one-time password",
            Self::SetCurrentDomain => "set current domain",
            Self::GetUserRoles => "get user roles",
            Self::CheckPermission => "check permission",
            Self::UploadFile => "upload file",
            Self::DownloadFile => "download file",
            Self::DeleteFiles => "delete files",
            Self::ListFiles => "list files",
            Self::GetPublicUrl => "build public URL",
            Self::CreateBucket => "create bucket",
            Self::GetBucket => "get bucket",
            Self::ListBuckets => "list buckets",
            Self::DeleteBucket => "delete bucket",
            Self::EmptyBucket => "empty bucket",
            Self::SubscribeToTable => "create subscription",
            Self::Unsubscribe => "remove subscription",
        }
    }

    pub fn domain(&self) -> Domain {
        match self {
            Self::Connect => Domain::Connection,
            Self::Select
            | Self::SelectOne
            | Self::Insert
            | Self::Update
            | Self::Delete
            | Self::Rpc => Domain::Query,
            Self::Login
            | Self::LoginWithProvider
            | Self::Logout
            | Self::Signup
            | Self::ResetPassword
            | Self::GetUser
            | Self::RefreshSession
            | Self::UpdateUser
            | Self::SetSession
            | Self::VerifyOtp => Domain::Auth,
            Self::SetCurrentDomain | Self::GetUserRoles | Self::CheckPermission => {
                Domain::Authorization
            }
            Self::UploadFile
            | Self::DownloadFile
            | Self::DeleteFiles
            | Self::ListFiles
            | Self::GetPublicUrl
            | Self::CreateBucket
            | Self::GetBucket
            | Self::ListBuckets
            | Self::DeleteBucket
            | Self::EmptyBucket => Domain::Storage,
            Self::SubscribeToTable | Self::Unsubscribe => Domain::Realtime,
        }
    }

    /// Whether the operation changes backend state
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Insert
                | Self::Update
                | Self::Delete
                | Self::UploadFile
                | Self::DeleteFiles
                | Self::CreateBucket
                | Self::DeleteBucket
                | Self::EmptyBucket
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crud_operations_share_query_domain() {
        for op in [
            Operation::Select,
            Operation::Insert,
            Operation::Update,
            Operation::Delete,
        ] {
            assert_eq!(op.domain(), Domain::Query);
        }
    }

    #[test]
    fn test_names() {
        assert_eq!(Operation::SetCurrentDomain.name(), "set_current_domain");
        assert_eq!(Operation::SubscribeToTable.to_string(), "subscribe_to_table");
        assert!(Operation::Delete.is_write());
        assert!(!Operation::Select.is_write());
    }
}
