pub mod gates;

use binding::Mod;
use gates::HornGates;

pub fn create_mod() -> Box<dyn Mod> {
    Box::new(HornGates::new())
}
