use actix_files::Files;
use actix_utils::future::{ready, Ready};
use actix_web::{
    dev::{self, ServiceResponse},
    error,
    http::{header::ContentType, StatusCode},
    middleware::{Compress, ErrorHandlerResponse, ErrorHandlers, Logger},
    route,
    web::{self, Data},
    App, FromRequest, HttpRequest, HttpResponse, HttpServer, Responder, Result,
};
use actix_web_lab::respond::Html;
use chrono::Utc;
use minijinja_autoreload::AutoReloader;
use noticeboard::events::{templating, Catalog};
use noticeboard::{AppConfig, SiteConfig};
use prometheus::{Registry, TextEncoder};
use serde::Deserialize;
use tokio::time::Duration;

struct MiniJinjaRenderer {
    tmpl_env: Data<AutoReloader>,
}

impl MiniJinjaRenderer {
    fn render(&self, tmpl: &str, ctx: impl Into<minijinja::value::Value>) -> Result<Html> {
        self.tmpl_env
            .acquire_env()
            .map_err(|_| error::ErrorInternalServerError("could not acquire template env"))?
            .get_template(tmpl)
            .map_err(|_| error::ErrorInternalServerError("could not find template"))?
            .render(ctx.into())
            .map(Html)
            .map_err(|err| {
                log::error!("{err}");
                error::ErrorInternalServerError("template error")
            })
    }
}

impl FromRequest for MiniJinjaRenderer {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _pl: &mut dev::Payload) -> Self::Future {
        let tmpl_env = <Data<AutoReloader>>::extract(req).into_inner().unwrap();

        ready(Ok(Self { tmpl_env }))
    }
}

/// The live search query, re-applied over the retained working set on
/// every request.
#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

#[route("/", method = "GET", method = "HEAD")]
async fn index(
    tmpl_env: MiniJinjaRenderer,
    catalog: Data<Catalog>,
    site: Data<SiteConfig>,
    params: web::Query<SearchParams>,
) -> Result<impl Responder> {
    let query = params.into_inner().q;
    let listing = catalog.listing(&query, Utc::now()).await;

    tmpl_env.render(
        "index.html",
        minijinja::context! {
            site => site.get_ref(),
            query => query,
            groups => templating::groups_value(&listing.groups),
            empty => listing.empty,
            notes => listing.notes,
        },
    )
}

#[route("/metrics", method = "GET")]
async fn metrics(registry: Data<Registry>) -> Result<impl Responder> {
    let body = TextEncoder::new()
        .encode_to_string(&registry.gather())
        .map_err(|err| {
            log::error!("{err}");
            error::ErrorInternalServerError("could not encode metrics")
        })?;

    Ok(HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .body(body))
}

#[actix_web::main]
async fn main() -> noticeboard::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    let config = AppConfig::load()?;

    let catalog = Catalog::from_config(&config.harvest)?;
    let registry = Registry::new();
    catalog.register_metrics(&registry)?;

    // An unreachable harvest source is not fatal: the listing just starts
    // out in the "no data yet" state until a later sync succeeds.
    if let Err(err) = catalog.sync_once().await {
        log::error!("initial harvest sync failed: {err}");
    }

    let sync_task = catalog
        .spawn_sync_task(Duration::from_secs(config.harvest.sync_period_secs))
        .await;

    if config.server.template_autoreload {
        log::info!("template auto-reloading is enabled");
    } else {
        log::info!(
            "template auto-reloading is disabled; run with NB_SERVER__TEMPLATE_AUTORELOAD=true to enable"
        );
    }

    let template_dir = config.server.template_dir.clone();
    let template_autoreload = config.server.template_autoreload;

    // The closure is invoked every time the environment is outdated to recreate it.
    let tmpl_reloader = AutoReloader::new(move |notifier| {
        let mut env: minijinja::Environment<'static> = minijinja::Environment::new();

        // if watch_path is never called, no fs watcher is created
        if template_autoreload {
            notifier.watch_path(&template_dir, true);
        }

        env.set_source(minijinja::Source::from_path(&template_dir));

        Ok(env)
    });

    let tmpl_reloader = Data::new(tmpl_reloader);
    let catalog = Data::new(catalog);
    let site = Data::new(config.site.clone());
    let registry = Data::new(registry);
    let static_dir = config.server.static_dir.clone();

    log::info!("starting HTTP server at {}", config.server.listen_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(catalog.clone())
            .app_data(site.clone())
            .app_data(registry.clone())
            .app_data(tmpl_reloader.clone())
            .service(metrics)
            .service(index)
            .service(Files::new("/static", &static_dir))
            .wrap(
                ErrorHandlers::new()
                    .handler(StatusCode::NOT_FOUND, not_found)
                    .handler(StatusCode::INTERNAL_SERVER_ERROR, internal_server_error),
            )
            .wrap(Compress::default())
            // Don't log things that could identify the user, e.g. omit client IP, referrer and
            // user agent.
            .wrap(Logger::new(r#""%r" %s %b %T"#))
    })
    .workers(2)
    .bind(config.server.listen_addr)?
    .run()
    .await?;

    sync_task.stop().await?;

    Ok(())
}

/// Error handler for a 404 Page not found error.
fn not_found<B>(svc_res: ServiceResponse<B>) -> Result<ErrorHandlerResponse<B>> {
    error_handler(svc_res, "not_found.html")
}

/// Error handler for a 500 Internal server error.
fn internal_server_error<B>(svc_res: ServiceResponse<B>) -> Result<ErrorHandlerResponse<B>> {
    error_handler(svc_res, "error.html")
}

/// Generic error handler.
fn error_handler<B>(svc_res: ServiceResponse<B>, tmpl: &str) -> Result<ErrorHandlerResponse<B>> {
    let req = svc_res.request();

    let reason = svc_res
        .status()
        .canonical_reason()
        .unwrap_or("Unknown error");
    let tmpl_env = MiniJinjaRenderer::extract(req).into_inner().unwrap();

    // Provide a fallback to a simple plain text response in case an error occurs during the
    // rendering of the error page.
    let fallback = |err: &str| {
        HttpResponse::build(svc_res.status())
            .content_type(ContentType::plaintext())
            .body(err.to_string())
    };

    let ctx = minijinja::context! {
        status_code => svc_res.status().as_str(),
        reason => reason,
    };

    let res = match tmpl_env.render(tmpl, ctx) {
        Ok(body) => body
            .customize()
            .with_status(svc_res.status())
            .respond_to(req)
            .map_into_boxed_body(),
        Err(_) => fallback(reason),
    };

    Ok(ErrorHandlerResponse::Response(ServiceResponse::new(
        svc_res.into_parts().0,
        res.map_into_right_body(),
    )))
}
