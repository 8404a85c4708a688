use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use temaripay::audit::MySqlAuditSink;
use temaripay::config::Config;
use temaripay::modules::calendar::PeriodCalendar;
use temaripay::modules::invoices::controllers::invoice_controller;
use temaripay::modules::invoices::repositories::{
    MySqlBillingPlanRepository, MySqlInvoiceRepository,
};
use temaripay::modules::invoices::services::{CarryForwardGenerator, InvoiceService};
use temaripay::modules::late_fees::controllers::late_fee_controller;
use temaripay::modules::late_fees::repositories::MySqlLateFeeRuleRepository;
use temaripay::modules::late_fees::services::{AccrualSweep, RuleService};
use temaripay::modules::payments::controllers::payment_controller;
use temaripay::modules::payments::repositories::MySqlPaymentRepository;
use temaripay::modules::payments::services::PaymentAllocator;
use temaripay::modules::roster::{MySqlAccountResolver, MySqlStudentRoster};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "temaripay=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");
    config.validate().expect("Configuration validation failed");

    tracing::info!("Starting TemariPay billing engine");
    tracing::info!("Environment: {}", config.app.env);
    tracing::info!("Academic year epoch: {}", config.calendar.epoch);

    let db_pool = config
        .database
        .create_pool()
        .await
        .expect("Failed to create database pool");
    tracing::info!(
        "Database pool initialized ({}-{} connections)",
        config.database.min_connections,
        config.database.max_connections
    );

    // Repositories and boundary adapters
    let invoices = Arc::new(MySqlInvoiceRepository::new(db_pool.clone()))
        as Arc<dyn temaripay::modules::invoices::repositories::InvoiceRepository>;
    let plans = Arc::new(MySqlBillingPlanRepository::new(db_pool.clone()))
        as Arc<dyn temaripay::modules::invoices::repositories::BillingPlanRepository>;
    let rules = Arc::new(MySqlLateFeeRuleRepository::new(db_pool.clone()))
        as Arc<dyn temaripay::modules::late_fees::repositories::LateFeeRuleRepository>;
    let payments = Arc::new(MySqlPaymentRepository::new(db_pool.clone()))
        as Arc<dyn temaripay::modules::payments::repositories::PaymentRepository>;
    let roster = Arc::new(MySqlStudentRoster::new(db_pool.clone()))
        as Arc<dyn temaripay::modules::roster::StudentRoster>;
    let accounts = Arc::new(MySqlAccountResolver::new(db_pool.clone()))
        as Arc<dyn temaripay::modules::roster::AccountResolver>;
    let audit = Arc::new(MySqlAuditSink::new(db_pool.clone()))
        as Arc<dyn temaripay::audit::AuditSink>;

    let calendar = PeriodCalendar::new(config.calendar.clone());

    // Services
    let sweep = Arc::new(AccrualSweep::new(
        invoices.clone(),
        rules.clone(),
        audit.clone(),
    ));
    let rule_service = Arc::new(RuleService::new(rules.clone(), audit.clone()));
    let generator = Arc::new(CarryForwardGenerator::new(
        invoices.clone(),
        plans.clone(),
        rules.clone(),
        roster.clone(),
        accounts.clone(),
        calendar,
        config.billing.clone(),
        audit.clone(),
    ));
    let invoice_service = Arc::new(InvoiceService::new(
        invoices.clone(),
        payments.clone(),
        roster.clone(),
        sweep.clone(),
        audit.clone(),
    ));
    let allocator = Arc::new(PaymentAllocator::new(
        invoices.clone(),
        payments.clone(),
        audit.clone(),
    ));

    let bind_address = config.server.bind_address();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(sweep.clone()))
            .app_data(web::Data::new(rule_service.clone()))
            .app_data(web::Data::new(generator.clone()))
            .app_data(web::Data::new(invoice_service.clone()))
            .app_data(web::Data::new(allocator.clone()))
            .configure(invoice_controller::configure)
            .configure(payment_controller::configure)
            .configure(late_fee_controller::configure)
            .route("/health", web::get().to(health_check))
    })
    .bind(&bind_address)?
    .run();

    tracing::info!("Server started at http://{}", bind_address);
    server.await
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "temaripay"
    }))
}
