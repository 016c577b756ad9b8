//! Route paths.

pub const POST_AUTH_REGISTER: &str = "/auth/register";
pub const POST_AUTH_LOGIN: &str = "/auth/login";
pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
pub const POST_AUTH_LOGOUT: &str = "/auth/logout";
pub const GET_AUTH_ME: &str = "/auth/me";

pub const GET_SCENARIOS: &str = "/scenarios";
pub const GET_SCENARIOS_SLUG: &str = "/scenarios/{slug}";

pub const CONVERSATIONS: &str = "/conversations";
pub const CONVERSATIONS_ID: &str = "/conversations/{id}";
pub const POST_CONVERSATIONS_ID_MESSAGES: &str = "/conversations/{id}/messages";

pub const POST_MESSAGES_ID_SPEECH: &str = "/messages/{id}/speech";
