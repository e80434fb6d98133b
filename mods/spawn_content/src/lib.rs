pub mod spawner;

use binding::Mod;
use spawner::SpawnContent;

pub fn create_mod() -> Box<dyn Mod> {
    Box::new(SpawnContent::new())
}
