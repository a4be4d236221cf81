pub mod batches;
pub mod health;
pub mod tasks;

pub fn routes() -> Vec<rocket::Route> {
    let mut routes = Vec::new();
    routes.extend(batches::routes());
    routes.extend(tasks::routes());
    routes
}
