use crate::{
    api::{attendance, scan, student},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let requests_per_min = requests_per_min.max(1);
        let per_ms = (60_000 / requests_per_min as u64).max(1);

        // Both values are non-zero here, so `finish` always yields a config.
        let limiter = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap_or_default();
        Governor::new(&limiter)
    }

    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(register_limiter.clone())
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(handlers::me)
            .service(
                web::scope("/students")
                    // /students
                    .service(
                        web::resource("")
                            .route(web::post().to(student::create_student))
                            .route(web::get().to(student::list_students)),
                    )
                    // /students/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(student::get_student))
                            .route(web::put().to(student::update_student))
                            .route(web::delete().to(student::delete_student)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    // /attendance
                    .service(
                        web::resource("")
                            .route(web::get().to(attendance::list_attendance))
                            .route(web::post().to(attendance::record_attendance)),
                    ),
            )
            .service(
                web::scope("/scan/sessions")
                    // /scan/sessions
                    .service(web::resource("").route(web::post().to(scan::open_session)))
                    // /scan/sessions/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(scan::get_session))
                            .route(web::delete().to(scan::close_session)),
                    )
                    // /scan/sessions/{id}/attendance-type
                    .service(
                        web::resource("/{id}/attendance-type")
                            .route(web::put().to(scan::set_attendance_type)),
                    )
                    // /scan/sessions/{id}/events
                    .service(
                        web::resource("/{id}/events").route(web::post().to(scan::submit_event)),
                    ),
            ),
    );
}

// LOGIN
//  ├─ access_token
//  └─ refresh_token

// SCANNER
//  ├─ POST /scan/sessions              → session id
//  ├─ POST /scan/sessions/{id}/events  → decoded payloads, camera state
//  └─ GET  /scan/sessions/{id}         → poll outcome, play cue on cue_seq change
