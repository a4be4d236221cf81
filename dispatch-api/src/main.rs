mod auth;
mod config;
mod error;
mod routes;

use dispatch_objectstore::{ObjectStore, ObjectStoreConfig};
use dispatch_queue::{Broker, BrokerConfig};
use dispatch_store::{EventStore, StoreConfig};
use rocket::fairing::AdHoc;
use rocket::launch;

use crate::config::ApiConfig;

async fn connect_backends(rocket: rocket::Rocket<rocket::Build>) -> rocket::Rocket<rocket::Build> {
    let store_config = StoreConfig::from_environment().expect("invalid event store configuration");
    let store = EventStore::new(&store_config).expect("failed to build event store client");
    store.ensure_index().await.expect("failed to ensure events index");

    let object_store_config = ObjectStoreConfig::from_environment().expect("invalid object store configuration");
    let object_store = ObjectStore::connect(&object_store_config)
        .await
        .expect("failed to connect to object store");

    let broker_config = BrokerConfig::from_environment().expect("invalid broker configuration");
    let broker = Broker::connect(&broker_config).await.expect("failed to connect to broker");

    let api_config = ApiConfig::from_environment().expect("API_SECRET_KEY must be set");

    rocket.manage(store).manage(object_store).manage(broker).manage(api_config)
}

#[launch]
fn rocket() -> _ {
    env_logger::init();

    let cors = rocket_cors::CorsOptions::default()
        .to_cors()
        .expect("CORS specification should be valid");

    rocket::build()
        .attach(cors)
        .attach(AdHoc::on_ignite("Connect backends", connect_backends))
        .mount("/", routes::health::routes())
        .mount("/api/v1", routes::routes())
}
