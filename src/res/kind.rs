//! Type tags of loadable resources.

use serde::{Deserialize, Serialize};

/// The closed set of resource types the cache knows about. Types form a small tree
/// rooted at `Object`; a request for a type is satisfied by any handle loaded at that
/// type or at one of its descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Object,
    Texture,
    Texture2D,
    RenderTexture,
    Sprite,
    SpriteAtlas,
    AudioClip,
    TextAsset,
    Material,
    Shader,
    Font,
    GameObject,
    /// Component types living on a prefab. They are loaded through their `GameObject`.
    Behaviour,
}

impl ResourceKind {
    /// Returns the direct parent of this type.
    pub fn parent(self) -> Option<ResourceKind> {
        use self::ResourceKind::*;

        match self {
            Object => None,
            Texture2D | RenderTexture => Some(Texture),
            _ => Some(Object),
        }
    }

    /// Iterates this type followed by all of its ancestors.
    #[inline]
    pub fn ancestors(self) -> Ancestors {
        Ancestors { next: Some(self) }
    }

    /// Returns true if a resource stored as `stored` could be handed out to a request
    /// of this type, that is `stored` is this type or one of its descendants.
    #[inline]
    pub fn is_satisfied_by(self, stored: ResourceKind) -> bool {
        stored.ancestors().any(|v| v == self)
    }

    /// Returns the type the storage should be asked for when loading this type.
    #[inline]
    pub fn storage_kind(self) -> ResourceKind {
        match self {
            ResourceKind::Behaviour => ResourceKind::GameObject,
            v => v,
        }
    }
}

impl Default for ResourceKind {
    fn default() -> Self {
        ResourceKind::Object
    }
}

pub struct Ancestors {
    next: Option<ResourceKind>,
}

impl Iterator for Ancestors {
    type Item = ResourceKind;

    fn next(&mut self) -> Option<Self::Item> {
        let v = self.next?;
        self.next = v.parent();
        Some(v)
    }
}

#[cfg(test)]
mod test {
    use super::ResourceKind::*;
    use super::*;

    #[test]
    fn subtype() {
        assert!(Texture.is_satisfied_by(Texture));
        assert!(Texture.is_satisfied_by(Texture2D));
        assert!(Object.is_satisfied_by(Texture2D));
        assert!(Object.is_satisfied_by(Behaviour));

        assert!(!Texture2D.is_satisfied_by(Texture));
        assert!(!Texture.is_satisfied_by(Sprite));
        assert!(!Sprite.is_satisfied_by(Object));
    }

    #[test]
    fn ancestors() {
        let v: Vec<_> = Texture2D.ancestors().collect();
        assert_eq!(v, vec![Texture2D, Texture, Object]);
        assert_eq!(Object.ancestors().count(), 1);
    }

    #[test]
    fn storage_kind() {
        assert_eq!(Behaviour.storage_kind(), GameObject);
        assert_eq!(Sprite.storage_kind(), Sprite);
    }
}
