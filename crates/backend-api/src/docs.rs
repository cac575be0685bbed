use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(title = "CampusNet API", description = "University social network backend"),
    paths(
        crate::routes::health::health_check,
        crate::routes::auth::register,
        crate::routes::auth::login,
        crate::routes::auth::logout,
        crate::routes::auth::logout_all,
        crate::routes::auth::me,
        crate::routes::auth::change_password,
        crate::routes::auth::delete_account,
        crate::routes::profiles::get_own_profile,
        crate::routes::profiles::update_own_profile,
        crate::routes::profiles::search_profiles,
        crate::routes::profiles::get_profile,
        crate::routes::posts::feed,
        crate::routes::posts::create_post,
        crate::routes::posts::get_post,
        crate::routes::posts::update_post,
        crate::routes::posts::delete_post,
        crate::routes::posts::user_posts,
        crate::routes::engagement::like_post,
        crate::routes::engagement::unlike_post,
        crate::routes::engagement::list_likes,
        crate::routes::engagement::list_comments,
        crate::routes::engagement::create_comment,
        crate::routes::engagement::update_comment,
        crate::routes::engagement::delete_comment,
        crate::routes::engagement::list_shares,
        crate::routes::engagement::share_post,
        crate::routes::connections::list_connections,
        crate::routes::connections::list_user_connections,
        crate::routes::connections::list_incoming,
        crate::routes::connections::list_outgoing,
        crate::routes::connections::connection_status,
        crate::routes::connections::suggestions,
        crate::routes::connections::send_request,
        crate::routes::connections::accept_request,
        crate::routes::connections::decline_request,
        crate::routes::connections::cancel_request,
        crate::routes::connections::remove_connection,
        crate::routes::messages::list_conversations,
        crate::routes::messages::open_conversation,
        crate::routes::messages::list_messages,
        crate::routes::messages::send_message,
        crate::routes::messages::mark_read,
        crate::routes::messages::delete_message,
        crate::routes::messages::unread_count,
        crate::routes::notifications::get_notifications,
        crate::routes::notifications::get_unread_count,
        crate::routes::notifications::mark_notification_read,
        crate::routes::notifications::mark_all_read,
        crate::routes::notifications::delete_notification,
        crate::routes::news::list_news,
        crate::routes::news::list_sources,
        crate::routes::news::get_news,
        crate::routes::news::scrape_news,
        crate::routes::advisor::list_sessions,
        crate::routes::advisor::create_session,
        crate::routes::advisor::get_session,
        crate::routes::advisor::rename_session,
        crate::routes::advisor::delete_session,
        crate::routes::advisor::send_message,
        crate::routes::websocket::websocket_handler,
        crate::routes::websocket::presence
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            crate::routes::health::HealthResponse,
            crate::routes::models::UserSummary,
            crate::routes::models::UserResponse,
            crate::routes::models::ConnectionStatus,
            crate::routes::models::ProfileResponse,
            crate::routes::models::UpdateProfileRequest,
            crate::routes::models::MeResponse,
            crate::routes::models::UsersResponse,
            crate::routes::models::RegisterRequest,
            crate::routes::models::LoginRequest,
            crate::routes::models::SessionResponse,
            crate::routes::models::ChangePasswordRequest,
            crate::routes::models::DeleteAccountRequest,
            crate::routes::models::RevokedSessionsResponse,
            crate::routes::models::Visibility,
            crate::routes::models::PostResponse,
            crate::routes::models::CreatePostRequest,
            crate::routes::models::UpdatePostRequest,
            crate::routes::models::PostsResponse,
            crate::routes::models::LikeResponse,
            crate::routes::models::CommentResponse,
            crate::routes::models::CommentRequest,
            crate::routes::models::CommentsResponse,
            crate::routes::models::ShareResponse,
            crate::routes::models::ShareRequest,
            crate::routes::models::SharesResponse,
            crate::routes::models::ConnectionDirection,
            crate::routes::models::ConnectionResponse,
            crate::routes::models::ConnectionRequestBody,
            crate::routes::models::ConnectionsResponse,
            crate::routes::models::ConnectionStatusResponse,
            crate::routes::models::SuggestionResponse,
            crate::routes::models::SuggestionsResponse,
            crate::routes::models::MessageResponse,
            crate::routes::models::ConversationResponse,
            crate::routes::models::OpenConversationRequest,
            crate::routes::models::ConversationsResponse,
            crate::routes::models::SendMessageRequest,
            crate::routes::models::MessagesResponse,
            crate::routes::models::MarkReadResponse,
            crate::routes::models::UnreadCountResponse,
            crate::routes::models::NotificationKind,
            crate::routes::models::NotificationResponse,
            crate::routes::models::NotificationsResponse,
            crate::routes::models::MarkNotificationRequest,
            crate::routes::models::BulkUpdateResponse,
            crate::routes::models::PresenceResponse,
            crate::routes::models::NewsItemResponse,
            crate::routes::models::NewsListResponse,
            crate::routes::models::NewsSourceResponse,
            crate::routes::models::NewsSourcesResponse,
            crate::routes::models::SourceReportResponse,
            crate::routes::models::ScrapeReportResponse,
            crate::routes::models::AdvisorSessionResponse,
            crate::routes::models::AdvisorMessageResponse,
            crate::routes::models::AdvisorSessionsResponse,
            crate::routes::models::AdvisorSessionDetailResponse,
            crate::routes::models::CreateAdvisorSessionRequest,
            crate::routes::models::RenameAdvisorSessionRequest,
            crate::routes::models::AdvisorMessageRequest,
            crate::routes::models::AdvisorReplyResponse
        )
    ),
    tags(
        (name = "Health", description = "Service health endpoints"),
        (name = "Auth", description = "Registration, sessions and account management"),
        (name = "Profiles", description = "User profiles and people search"),
        (name = "Feed", description = "Posts and the home feed"),
        (name = "Engagement", description = "Likes, comments and shares"),
        (name = "Network", description = "Connections between users"),
        (name = "Messaging", description = "Direct conversations"),
        (name = "Notifications", description = "User notifications"),
        (name = "News", description = "Scraped university news"),
        (name = "Advisor", description = "AI career advisor sessions"),
        (name = "Realtime", description = "Websocket events and presence")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        let schemes = &mut components.security_schemes;

        let mut scheme = SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer));
        if let SecurityScheme::Http(http) = &mut scheme {
            http.bearer_format = Some("opaque session token".to_string());
        }

        schemes.insert("bearerAuth".to_string(), scheme);
    }
}
