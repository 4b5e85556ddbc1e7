use std::sync::Arc;

use actix_web::http::{Method, header};
use actix_web::{HttpRequest, HttpResponse, HttpResponseBuilder, web};
use log::{info, warn};
use voidsink_core::SequenceGenerator;

use super::body::{TextSource, TrapBody};
use super::gzip::GzipSource;
use super::json::JsonSource;
use super::login::{self, LoginForm};
use super::{ChunkSource, EndpointKind, TrapContext, maze};

const ROBOTS: &str = "User-agent: *\nDisallow: /";
const HTML: &str = "text/html; charset=utf-8";

/// Sends every path to `dispatch`.
pub(crate) fn configure(cfg: &mut web::ServiceConfig) {
	cfg.route("/{tail:.*}", web::route().to(dispatch));
}

/// Who is knocking.
struct Visitor<'a> {
	ip: String,
	user_agent: &'a str,
}

impl<'a> Visitor<'a> {
	fn of(req: &'a HttpRequest) -> Self {
		Self {
			ip: req.peer_addr().map(|a| a.ip().to_string()).unwrap_or_else(|| "unknown".to_owned()),
			user_agent: req.headers().get(header::USER_AGENT).and_then(|v| v.to_str().ok()).unwrap_or(""),
		}
	}
}

async fn dispatch(req: HttpRequest, form: Option<web::Form<LoginForm>>, ctx: web::Data<TrapContext>) -> HttpResponse {
	let visitor = Visitor::of(&req);
	let path = req.path();

	match ctx.kind {
		EndpointKind::Metrics => metrics(path, &ctx),
		EndpointKind::CredentialHarvest => {
			record_hit(&ctx, path, &visitor, false);
			credential_harvest(req.method(), form.map(web::Form::into_inner), &ctx, &visitor)
		}
		EndpointKind::HttpInfinite if path == "/robots.txt" => {
			record_hit(&ctx, path, &visitor, false);
			HttpResponse::Ok().content_type("text/plain; charset=utf-8").body(ROBOTS)
		}
		EndpointKind::HttpInfinite => {
			record_hit(&ctx, path, &visitor, true);
			let source = TextSource::new(Arc::clone(&ctx.shared.model), Arc::clone(&ctx.shared.pool));
			let mut response = HttpResponse::Ok();
			response.content_type(HTML).force_close();
			stream(&ctx, response, source)
		}
		EndpointKind::JsonInfinite => {
			record_hit(&ctx, path, &visitor, true);
			let source = JsonSource::new(Arc::clone(&ctx.shared.model), Arc::clone(&ctx.shared.pool));
			let mut response = HttpResponse::Ok();
			response.content_type("application/json").force_close();
			stream(&ctx, response, source)
		}
		EndpointKind::GzipBomb => {
			record_hit(&ctx, path, &visitor, true);
			let mut response = HttpResponse::Ok();
			response
				.content_type("text/plain")
				.insert_header((header::CONTENT_ENCODING, "gzip"))
				.force_close();
			stream(&ctx, response, GzipSource::new())
		}
		EndpointKind::CrawlerMaze => {
			record_hit(&ctx, path, &visitor, true);
			let model = &ctx.shared.model;
			let mut generator = SequenceGenerator::from_entropy(model);
			let page = maze::render(path, model, &mut generator, ctx.settings.links.clone());
			HttpResponse::Ok().content_type(HTML).body(page)
		}
	}
}

fn record_hit(ctx: &TrapContext, path: &str, visitor: &Visitor<'_>, alert: bool) {
	let name = ctx.kind.display_name();
	info!("{name} hit: path={path} remote_addr={}", visitor.ip);
	ctx.shared.telemetry.trap_hit(ctx.kind.label(), path);
	if alert && let Some(alerter) = &ctx.shared.alerter {
		alerter.send_alert(name, &visitor.ip, visitor.user_agent);
	}
}

fn stream<S: ChunkSource + Unpin + 'static>(ctx: &TrapContext, mut response: HttpResponseBuilder, source: S) -> HttpResponse {
	let body = TrapBody::new(source, ctx.streams.clone(), ctx.shared.telemetry.clone(), ctx.settings.chunk_delay);
	response.body(body)
}

fn credential_harvest(method: &Method, form: Option<LoginForm>, ctx: &TrapContext, visitor: &Visitor<'_>) -> HttpResponse {
	if method != Method::POST {
		return HttpResponse::Ok().content_type(HTML).body(login::render(false));
	}

	if let Some(form) = form.filter(|f| !f.is_empty()) {
		warn!(
			"credentials captured: username={} password={} remote_addr={}",
			form.username, form.password, visitor.ip
		);
		ctx.shared.telemetry.credentials_captured();
		if let Some(alerter) = &ctx.shared.alerter {
			let trap = format!("LoginTrap (User: {}, Pass: {})", form.username, form.password);
			alerter.send_alert(&trap, &visitor.ip, visitor.user_agent);
		}
	}
	HttpResponse::Ok().content_type(HTML).body(login::render(true))
}

fn metrics(path: &str, ctx: &TrapContext) -> HttpResponse {
	if path != "/metrics" {
		return HttpResponse::NotFound().finish();
	}
	HttpResponse::Ok()
		.content_type("text/plain; version=0.0.4; charset=utf-8")
		.body(ctx.shared.telemetry.render())
}
