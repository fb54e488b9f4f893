// server/src/web/routes.rs

use actix_web::web;

use crate::web::handlers::{
  book_handlers, courier_handlers, email_handlers, health_handlers, notification_handlers, order_handlers,
  payment_handlers, subaccount_handlers,
};

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_handlers::health_handler))
      .service(
        web::scope("/books")
          .route("", web::get().to(book_handlers::list_books_handler))
          .route("/{book_id}", web::get().to(book_handlers::get_book_handler)),
      )
      .service(
        web::scope("/payments")
          .route("/initialize", web::post().to(payment_handlers::initialize_payment_handler))
          .route(
            "/verify/{reference}",
            web::get().to(payment_handlers::verify_payment_handler),
          ),
      )
      .service(
        web::scope("/orders")
          .route("", web::get().to(order_handlers::list_orders_handler))
          .route("/{order_id}", web::get().to(order_handlers::get_order_handler))
          .route("/{order_id}/commit", web::post().to(order_handlers::commit_order_handler))
          .route("/{order_id}/decline", web::post().to(order_handlers::decline_order_handler))
          .route("/{order_id}/cancel", web::post().to(order_handlers::cancel_order_handler))
          .route(
            "/{order_id}/delivered",
            web::post().to(order_handlers::mark_delivered_handler),
          )
          .route("/{order_id}/tracking", web::get().to(order_handlers::order_tracking_handler)),
      )
      .service(
        web::scope("/subaccounts")
          .route("", web::post().to(subaccount_handlers::save_subaccount_handler))
          .route("/me", web::get().to(subaccount_handlers::my_subaccount_handler)),
      )
      .service(
        web::scope("/courier")
          .route("/quotes", web::post().to(courier_handlers::quotes_handler))
          .route("/health", web::get().to(courier_handlers::courier_health_handler))
          .route(
            "/{provider}/shipments",
            web::post().to(courier_handlers::create_shipment_handler),
          )
          .route(
            "/{provider}/track/{tracking_number}",
            web::get().to(courier_handlers::track_handler),
          ),
      )
      .service(
        web::scope("/notifications")
          .route("", web::get().to(notification_handlers::list_notifications_handler))
          .route(
            "/{notification_id}/read",
            web::post().to(notification_handlers::mark_read_handler),
          ),
      )
      .route("/emails", web::post().to(email_handlers::send_email_handler)),
  );
}
