use anyhow::Result;
use api::{AudioClip, ModLogger, ObjectRef, Quat, Scene, Value, Vec3};
use binding::{HookTarget, Mod, ModContext};
use std::sync::{Arc, Mutex};

pub const PREFAB_ADDRESS: &str = "Mod/AddingContentExample/Assets/ExampleSphere";
pub const AUDIO_ADDRESS: &str = "Mod/AddingContentExample/Assets/EWWUPPP";

const SPAWN_KEY: char = 'K';
const SOUND_KEY: char = 'L';
const SPAWN_DISTANCE: f32 = 3.0;

/// K spawns a prefab in front of the player, L plays a sound at the player.
pub struct SpawnContent {
    debug: bool,
    logger: Option<ModLogger>,
    spawn_down: bool,
    sound_down: bool,
    clip: Arc<Mutex<Option<ObjectRef>>>,
}

impl SpawnContent {
    pub fn new() -> Self {
        Self {
            debug: true,
            logger: None,
            spawn_down: false,
            sound_down: false,
            clip: Arc::new(Mutex::new(None)),
        }
    }

    pub fn has_cached_clip(&self) -> bool {
        self.clip.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    fn logger(&self) -> ModLogger {
        self.logger
            .clone()
            .unwrap_or_else(|| ModLogger::new("SpawnContent"))
    }

    fn info(&self, message: &str) {
        if self.debug {
            self.logger().info(message);
        }
    }

    fn spawn(&self, player: &ObjectRef, ctx: &ModContext) {
        let placement = player.placement();
        let position = placement.position + placement.forward() * SPAWN_DISTANCE + Vec3::Y;
        self.info(&format!("Spawning at {}", position));

        let logger = self.logger();
        let debug = self.debug;
        ctx.loader()
            .instantiate_async(PREFAB_ADDRESS, position, Quat::IDENTITY, move |spawned| {
                match spawned {
                    Some(spawned) if debug => logger.info(&format!("Spawned {}", spawned.name())),
                    Some(_) => {}
                    None => logger.warn("Spawn failed - object is null"),
                }
            });
    }

    fn play_sound(&self, player: &ObjectRef, scene: Arc<dyn Scene>, ctx: &ModContext) {
        let cached = self.clip.lock().ok().and_then(|c| c.clone());
        if let Some(clip) = cached {
            scene.play_clip_at(&clip, player.placement().position);
            self.info("Playing cached clip");
            return;
        }

        self.info("Loading audio...");
        let cache = self.clip.clone();
        let logger = self.logger();
        let player = player.clone();
        ctx.loader()
            .load_async::<AudioClip, _>(AUDIO_ADDRESS, move |clip| match clip {
                Some(clip) => {
                    if let Ok(mut cache) = cache.lock() {
                        *cache = Some(clip.clone());
                    }
                    scene.play_clip_at(&clip, player.placement().position);
                }
                None => logger.warn("Audio load failed - clip is null"),
            });
    }
}

impl Default for SpawnContent {
    fn default() -> Self {
        Self::new()
    }
}

impl Mod for SpawnContent {
    fn name(&self) -> &str {
        "SpawnContent"
    }

    fn target(&self) -> HookTarget {
        HookTarget::parameterless("PlayerOwner:Update")
    }

    fn initialize(&mut self, logger: ModLogger) -> Result<()> {
        logger.info("K spawns content, L plays a sound");
        self.logger = Some(logger);
        Ok(())
    }

    fn postfix(&mut self, instance: &Value, ctx: &ModContext) -> Result<()> {
        let (Some(player), Some(scene)) = (instance.as_object(), ctx.scene()) else {
            return Ok(());
        };

        let spawn = scene.key_held(SPAWN_KEY);
        if spawn && !self.spawn_down {
            self.spawn(player, ctx);
        }
        self.spawn_down = spawn;

        let sound = scene.key_held(SOUND_KEY);
        if sound && !self.sound_down {
            self.play_sound(player, scene, ctx);
        }
        self.sound_down = sound;
        Ok(())
    }
}
