#[macro_use]
extern crate rocket;

#[launch]
fn rocket() -> _ {
    let rocket = tracker_api::rocket();
    log::info!("starting tracker API server");
    rocket
}
