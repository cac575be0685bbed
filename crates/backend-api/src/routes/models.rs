//! Request and response bodies shared by the route handlers and services.
//!
//! Every `id` field is a public id. Author and participant details are
//! assembled from `users`/`user_profiles` at read time.

use campusnet_auth::User;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::util::Page;

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    /// Page size, 1 to 100 (default 20).
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page::new(self.limit, self.offset)
    }
}

// ---- users and profiles ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub full_name: String,
    pub role: String,
    pub headline: Option<String>,
    pub avatar_url: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub created_at: String,
    pub last_login_at: Option<String>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.public_id.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role.as_str().to_string(),
            created_at: user.created_at.clone(),
            last_login_at: user.last_login_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    None,
    PendingOutgoing,
    PendingIncoming,
    Connected,
    #[serde(rename = "self")]
    Myself,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub user: UserSummary,
    pub about: Option<String>,
    pub program: Option<String>,
    pub graduation_year: Option<i64>,
    pub location: Option<String>,
    pub website_url: Option<String>,
    pub skills: Vec<String>,
    pub connection_count: i64,
    pub connection_status: ConnectionStatus,
    pub updated_at: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub headline: Option<String>,
    pub about: Option<String>,
    pub department: Option<String>,
    pub program: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i64>)]
    pub graduation_year: Option<Option<i64>>,
    pub location: Option<String>,
    pub avatar_url: Option<String>,
    pub website_url: Option<String>,
    pub skills: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user: UserResponse,
    pub profile: ProfileResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UsersResponse {
    pub users: Vec<UserSummary>,
}

// ---- auth ----

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteAccountRequest {
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokedSessionsResponse {
    pub revoked: u64,
}

// ---- feed ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Connections,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Connections => "connections",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Self::Public),
            "connections" => Some(Self::Connections),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostResponse {
    pub id: String,
    pub author: UserSummary,
    pub content: String,
    pub image_url: Option<String>,
    pub visibility: Visibility,
    pub like_count: i64,
    pub comment_count: i64,
    pub share_count: i64,
    pub liked_by_me: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePostRequest {
    pub content: String,
    pub image_url: Option<String>,
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdatePostRequest {
    pub content: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub image_url: Option<Option<String>>,
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PostsResponse {
    pub posts: Vec<PostResponse>,
}

// ---- engagement ----

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LikeResponse {
    pub liked: bool,
    pub like_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentResponse {
    pub id: String,
    pub post_id: String,
    pub author: UserSummary,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CommentRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CommentsResponse {
    pub comments: Vec<CommentResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShareResponse {
    pub id: String,
    pub post_id: String,
    pub user: UserSummary,
    pub commentary: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ShareRequest {
    pub commentary: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SharesResponse {
    pub shares: Vec<ShareResponse>,
}

// ---- network ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionDirection {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionResponse {
    pub id: String,
    /// The other party of the connection.
    pub user: UserSummary,
    pub status: String,
    pub direction: ConnectionDirection,
    pub note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ConnectionRequestBody {
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionsResponse {
    pub connections: Vec<ConnectionResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionStatusResponse {
    pub status: ConnectionStatus,
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SuggestionResponse {
    pub user: UserSummary,
    pub mutual_connections: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<SuggestionResponse>,
}

// ---- messaging ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct MessageResponse {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: String,
    pub read_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationResponse {
    pub id: String,
    pub participant: UserSummary,
    pub last_message: Option<MessageResponse>,
    pub unread_count: i64,
    pub last_message_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OpenConversationRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationResponse>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessagesResponse {
    pub messages: Vec<MessageResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MarkReadResponse {
    pub updated: u64,
    pub read_at: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UnreadCountResponse {
    pub count: i64,
}

// ---- notifications ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PostLiked,
    PostCommented,
    PostShared,
    ConnectionRequested,
    ConnectionAccepted,
    MessageReceived,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostLiked => "post_liked",
            Self::PostCommented => "post_commented",
            Self::PostShared => "post_shared",
            Self::ConnectionRequested => "connection_requested",
            Self::ConnectionAccepted => "connection_accepted",
            Self::MessageReceived => "message_received",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            Self::PostLiked,
            Self::PostCommented,
            Self::PostShared,
            Self::ConnectionRequested,
            Self::ConnectionAccepted,
            Self::MessageReceived,
            Self::System,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct NotificationResponse {
    pub id: String,
    pub kind: NotificationKind,
    pub actor: Option<UserSummary>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationsResponse {
    pub notifications: Vec<NotificationResponse>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MarkNotificationRequest {
    pub read: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkUpdateResponse {
    pub updated: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PresenceResponse {
    /// Public ids of accepted connections with at least one live socket.
    pub online: Vec<String>,
}

// ---- news ----

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewsItemResponse {
    pub id: String,
    pub source: String,
    pub category: Option<String>,
    pub title: String,
    pub link: String,
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub published_at: Option<String>,
    pub scraped_at: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NewsListResponse {
    pub news: Vec<NewsItemResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NewsSourceResponse {
    pub name: String,
    pub url: Option<String>,
    pub category: Option<String>,
    pub item_count: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NewsSourcesResponse {
    pub sources: Vec<NewsSourceResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SourceReportResponse {
    pub name: String,
    pub url: String,
    pub fetched: usize,
    pub inserted: u64,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScrapeReportResponse {
    pub started_at: String,
    pub finished_at: String,
    pub inserted: u64,
    pub failed: usize,
    pub sources: Vec<SourceReportResponse>,
}

// ---- advisor ----

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdvisorSessionResponse {
    pub id: String,
    pub title: String,
    pub message_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdvisorMessageResponse {
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdvisorSessionsResponse {
    pub sessions: Vec<AdvisorSessionResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdvisorSessionDetailResponse {
    pub session: AdvisorSessionResponse,
    pub messages: Vec<AdvisorMessageResponse>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateAdvisorSessionRequest {
    pub title: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RenameAdvisorSessionRequest {
    pub title: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdvisorMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdvisorReplyResponse {
    pub session: AdvisorSessionResponse,
    pub user_message: AdvisorMessageResponse,
    pub reply: AdvisorMessageResponse,
}
