//! Food items.

use crate::config::FoodVariantKind;
use glam::Vec2;
use protocol::packets::{FoodCode, FoodInfo};

/// Size grade of ordinary food.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoodGrade {
    Small,
    Medium,
}

/// What kind of food an item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoodKind {
    Normal { grade: FoodGrade },
    Bonus,
    /// Negative value; never replaced when eaten.
    Virus,
}

impl FoodKind {
    /// Wire code for this kind.
    pub fn code(&self) -> FoodCode {
        match self {
            FoodKind::Normal { grade: FoodGrade::Small } => FoodCode::Small,
            FoodKind::Normal { grade: FoodGrade::Medium } => FoodCode::Medium,
            FoodKind::Bonus => FoodCode::Bonus,
            FoodKind::Virus => FoodCode::Virus,
        }
    }

    /// Whether eating this kind spawns an immediate replacement.
    pub fn is_replaced_on_eat(&self) -> bool {
        !matches!(self, FoodKind::Virus)
    }
}

impl From<FoodVariantKind> for FoodKind {
    fn from(kind: FoodVariantKind) -> Self {
        match kind {
            FoodVariantKind::Small => FoodKind::Normal { grade: FoodGrade::Small },
            FoodVariantKind::Medium => FoodKind::Normal { grade: FoodGrade::Medium },
            FoodVariantKind::Bonus => FoodKind::Bonus,
            FoodVariantKind::Virus => FoodKind::Virus,
        }
    }
}

/// A stationary food item.
#[derive(Debug, Clone)]
pub struct Food {
    pub id: u32,
    pub position: Vec2,
    pub radius: f32,
    /// Score change applied to whoever eats it.
    pub value: i32,
    pub kind: FoodKind,
    /// Milliseconds since spawn.
    pub age: u64,
    /// Food is removed once `age >= max_age`.
    pub max_age: u64,
}

impl Food {
    pub fn new(id: u32, kind: FoodKind, position: Vec2, radius: f32, value: i32, max_age: u64) -> Self {
        Self {
            id,
            position,
            radius,
            value,
            kind,
            age: 0,
            max_age,
        }
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.age >= self.max_age
    }

    pub fn info(&self) -> FoodInfo {
        FoodInfo {
            id: self.id,
            kind: self.kind.code(),
            x: self.position.x,
            y: self.position.y,
            radius: self.radius,
            value: self.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virus_is_not_replaced() {
        assert!(!FoodKind::Virus.is_replaced_on_eat());
        assert!(FoodKind::Bonus.is_replaced_on_eat());
        assert!(FoodKind::from(FoodVariantKind::Small).is_replaced_on_eat());
    }

    #[test]
    fn test_expiry_boundary() {
        let mut food = Food::new(1, FoodKind::Bonus, Vec2::ZERO, 8.0, 5, 1000);
        food.age = 999;
        assert!(!food.is_expired());
        food.age = 1000;
        assert!(food.is_expired());
    }

    #[test]
    fn test_info_carries_code() {
        let food = Food::new(4, FoodKind::from(FoodVariantKind::Medium), Vec2::new(3.0, 4.0), 5.0, 3, 10);
        let info = food.info();
        assert_eq!(info.kind, FoodCode::Medium);
        assert_eq!((info.x, info.y, info.value), (3.0, 4.0, 3));
    }
}
