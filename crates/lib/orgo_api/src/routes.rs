//! Route paths served by the API.

pub const GET_API_HEALTHY: &str = "/api/healthy";

pub const POST_API_REGISTER: &str = "/api/register";
pub const POST_API_LOGIN: &str = "/api/login";
pub const POST_API_LOGOUT: &str = "/api/logout";
pub const POST_API_LOGOUT_ALL: &str = "/api/logout-all";

pub const GET_API_VERIFY: &str = "/api/verify";
pub const GET_API_VERIFY_ROLE: &str = "/api/verify_role";
pub const GET_API_VERIFY_PERMISSION: &str = "/api/verify_permission";

pub const GET_API_USER: &str = "/api/user";
pub const DELETE_API_DELETE: &str = "/api/delete";
pub const DELETE_API_DELETE_UID: &str = "/api/delete/{uid}";

pub const POST_API_FORGOT_PASSWORD: &str = "/api/forgot-password";
pub const API_RESET_PASSWORD_TOKEN: &str = "/api/reset-password/{token}";

pub const API_PROJECT_TOKENS: &str = "/api/projects/{project_key}/tokens";
pub const DELETE_API_PROJECT_TOKENS_ID: &str = "/api/projects/{project_key}/tokens/{token_id}";
pub const API_PROJECT_TOKENS_MY: &str = "/api/projects/tokens/my";
