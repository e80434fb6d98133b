pub mod server;

use binding::Mod;
use server::ServerDebug;

pub fn create_mod() -> Box<dyn Mod> {
    Box::new(ServerDebug::new())
}
