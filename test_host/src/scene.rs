use api::{HostFault, ObjectRef, Placement, Scene, Search, TypeInfo, Vec3};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

/// A flat world of objects with parent links standing in for a hierarchy.
#[derive(Default)]
pub struct MemoryScene {
    objects: RwLock<Vec<ObjectRef>>,
    parents: RwLock<HashMap<u64, ObjectRef>>,
    destroyed: Mutex<Vec<u64>>,
    keys: RwLock<HashSet<char>>,
    played: Mutex<Vec<(u64, Vec3)>>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts `object` into the world.
    pub fn spawn(&self, object: ObjectRef) -> ObjectRef {
        if let Ok(mut objects) = self.objects.write() {
            objects.push(object.clone());
        }
        object
    }

    /// Spawns `child` under `parent`.
    pub fn attach(&self, child: ObjectRef, parent: &ObjectRef) -> ObjectRef {
        if let Ok(mut parents) = self.parents.write() {
            parents.insert(child.id(), parent.clone());
        }
        self.spawn(child)
    }

    pub fn objects(&self) -> Vec<ObjectRef> {
        self.objects.read().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn contains(&self, object: &ObjectRef) -> bool {
        self.objects().iter().any(|o| o.id() == object.id())
    }

    pub fn destroyed(&self) -> Vec<u64> {
        self.destroyed.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn press(&self, key: char) {
        if let Ok(mut keys) = self.keys.write() {
            keys.insert(key.to_ascii_uppercase());
        }
    }

    pub fn release(&self, key: char) {
        if let Ok(mut keys) = self.keys.write() {
            keys.remove(&key.to_ascii_uppercase());
        }
    }

    /// `(clip id, position)` for every clip played so far.
    pub fn played(&self) -> Vec<(u64, Vec3)> {
        self.played.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn parent_of(&self, object: &ObjectRef) -> Option<ObjectRef> {
        self.parents.read().ok()?.get(&object.id()).cloned()
    }

    fn children_of(&self, object: &ObjectRef) -> Vec<ObjectRef> {
        let Ok(parents) = self.parents.read() else {
            return Vec::new();
        };
        self.objects()
            .into_iter()
            .filter(|o| parents.get(&o.id()).is_some_and(|p| p.id() == object.id()))
            .collect()
    }
}

impl Scene for MemoryScene {
    fn instantiate(&self, template: &ObjectRef, placement: Placement) -> Result<ObjectRef, HostFault> {
        Ok(self.spawn(template.duplicate(placement)))
    }

    fn destroy(&self, object: &ObjectRef) -> Result<(), HostFault> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| HostFault::Raised("scene poisoned".to_string()))?;
        objects.retain(|o| o.id() != object.id());
        drop(objects);
        if let Ok(mut destroyed) = self.destroyed.lock() {
            destroyed.push(object.id());
        }
        Ok(())
    }

    fn overlap_sphere(&self, origin: Vec3, radius: f32) -> Result<Vec<ObjectRef>, HostFault> {
        Ok(self
            .objects()
            .into_iter()
            .filter(|o| o.placement().position.distance(origin) <= radius)
            .collect())
    }

    fn find_component(&self, object: &ObjectRef, ty: &TypeInfo, search: Search) -> Option<ObjectRef> {
        match search {
            Search::SelfAndParents => {
                std::iter::successors(Some(object.clone()), |o| self.parent_of(o))
                    .find(|o| o.is_instance_of(ty))
            }
            Search::SelfAndChildren => {
                let mut queue = vec![object.clone()];
                while !queue.is_empty() {
                    let current = queue.remove(0);
                    if current.is_instance_of(ty) {
                        return Some(current);
                    }
                    queue.extend(self.children_of(&current));
                }
                None
            }
        }
    }

    fn key_held(&self, key: char) -> bool {
        self.keys
            .read()
            .map(|keys| keys.contains(&key.to_ascii_uppercase()))
            .unwrap_or(false)
    }

    fn play_clip_at(&self, clip: &ObjectRef, position: Vec3) {
        if let Ok(mut played) = self.played.lock() {
            played.push((clip.id(), position));
        }
    }
}
