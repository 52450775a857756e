use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Langar Seva Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::sse::admin_stream,
        crate::routes::sse::session_stream,
        crate::routes::session::start_session,
        crate::routes::session::get_session,
        crate::routes::session::end_session,
        crate::routes::session::set_display_name,
        crate::routes::session::enter,
        crate::routes::session::select_avatar,
        crate::routes::session::confirm_avatar,
        crate::routes::session::set_preparation_step,
        crate::routes::session::confirm_preparation,
        crate::routes::session::select_food,
        crate::routes::session::start_playing,
        crate::routes::session::move_player,
        crate::routes::session::serve,
        crate::routes::session::tap_cell,
        crate::routes::session::play_again,
        crate::routes::websocket::ws_handler,
        crate::routes::public::get_scoreboard,
        crate::routes::public::get_catalog,
        crate::routes::admin::user_count,
        crate::routes::admin::remove_all_users,
        crate::routes::admin::remove_inactive_users,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::StartSessionRequest,
            crate::dto::session::DisplayNameRequest,
            crate::dto::session::AvatarRequest,
            crate::dto::session::PreparationStepRequest,
            crate::dto::session::FoodRequest,
            crate::dto::session::MoveRequest,
            crate::dto::session::SessionSnapshot,
            crate::dto::session::FieldSnapshot,
            crate::dto::session::ServeResponse,
            crate::dto::scoreboard::ScoreboardSnapshot,
            crate::dto::catalog::CatalogResponse,
            crate::dto::maintenance::UserCountResponse,
            crate::dto::maintenance::MaintenanceReport,
            crate::dto::maintenance::MaintenanceStatusEvent,
            crate::dto::maintenance::MaintenanceCountEvent,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::ServedEvent,
            crate::dto::sse::MarkerClearedEvent,
            crate::dto::sse::IdentityChangedEvent,
            crate::dto::ws::PlayInboundMessage,
            crate::dto::ws::PlayOutboundMessage,
            crate::state::state_machine::FlowPhase,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "session", description = "Game flow of a player session"),
        (name = "play", description = "Moving and serving during a round"),
        (name = "public", description = "Scoreboard and catalog"),
        (name = "admin", description = "Maintenance console operations"),
    )
)]
pub struct ApiDoc;
