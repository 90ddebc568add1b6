//! Domain catalogs — rooms, products, pricing (SPEC_FULL.md §1, out of scope
//! as *implementations*, specified here only via the read-only interface the
//! kernel consumes plus an in-memory reference implementation for tests).

use dashmap::DashMap;

#[derive(Debug, Clone)]
pub struct Room {
    pub room_id: String,
    pub name: String,
    pub capacity: u32,
    pub features: Vec<String>,
    pub base_rate: f64,
}

#[derive(Debug, Clone)]
pub struct Product {
    pub product_id: String,
    pub name: String,
    pub unit_price: f64,
    pub per_person: bool,
}

/// Read-only lookups the kernel needs from the venue's room/product/pricing
/// catalog. Implementations may hit a database or a remote service; the
/// kernel never mutates through this trait.
pub trait DomainCatalog: Send + Sync {
    fn rooms_for(&self, participants: u32, features: &[String]) -> Vec<Room>;
    fn room_by_id(&self, room_id: &str) -> Option<Room>;
    fn room_by_name(&self, name: &str) -> Option<Room>;
    fn product_by_name(&self, name: &str) -> Option<Product>;
    fn default_deposit_fraction(&self) -> f64;
}

/// Fixed-catalog reference implementation, cached with `dashmap` so repeated
/// lookups within a turn (or across turns within one process) don't re-scan
/// the backing list. `clear()` invalidates the cache for tests.
pub struct InMemoryCatalog {
    rooms: Vec<Room>,
    products: Vec<Product>,
    room_cache: DashMap<String, Option<Room>>,
}

impl InMemoryCatalog {
    pub fn new(rooms: Vec<Room>, products: Vec<Product>) -> Self {
        InMemoryCatalog {
            rooms,
            products,
            room_cache: DashMap::new(),
        }
    }

    pub fn clear(&self) {
        self.room_cache.clear();
    }
}

impl DomainCatalog for InMemoryCatalog {
    fn rooms_for(&self, participants: u32, features: &[String]) -> Vec<Room> {
        let mut matches: Vec<Room> = self
            .rooms
            .iter()
            .filter(|r| r.capacity >= participants)
            .filter(|r| features.iter().all(|f| r.features.contains(f)))
            .cloned()
            .collect();
        matches.sort_by_key(|r| r.capacity);
        matches
    }

    fn room_by_id(&self, room_id: &str) -> Option<Room> {
        if let Some(hit) = self.room_cache.get(room_id) {
            return hit.clone();
        }
        let found = self.rooms.iter().find(|r| r.room_id == room_id).cloned();
        self.room_cache.insert(room_id.to_string(), found.clone());
        found
    }

    fn room_by_name(&self, name: &str) -> Option<Room> {
        let lower = name.to_lowercase();
        self.rooms
            .iter()
            .find(|r| r.name.to_lowercase() == lower)
            .cloned()
    }

    fn product_by_name(&self, name: &str) -> Option<Product> {
        let lower = name.to_lowercase();
        self.products
            .iter()
            .find(|p| p.name.to_lowercase() == lower)
            .cloned()
    }

    fn default_deposit_fraction(&self) -> f64 {
        0.3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_catalog() -> InMemoryCatalog {
        InMemoryCatalog::new(
            vec![
                Room {
                    room_id: "room-a".into(),
                    name: "Room A".into(),
                    capacity: 30,
                    features: vec!["projector".into()],
                    base_rate: 500.0,
                },
                Room {
                    room_id: "room-e".into(),
                    name: "Room E".into(),
                    capacity: 120,
                    features: vec!["projector".into(), "stage".into()],
                    base_rate: 1500.0,
                },
            ],
            vec![Product {
                product_id: "coffee".into(),
                name: "Coffee Service".into(),
                unit_price: 4.5,
                per_person: true,
            }],
        )
    }

    #[test]
    fn test_rooms_for_filters_by_capacity_and_features() {
        let cat = sample_catalog();
        let rooms = cat.rooms_for(50, &["projector".to_string()]);
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].room_id, "room-e");
    }

    #[test]
    fn test_room_by_id_caches() {
        let cat = sample_catalog();
        assert!(cat.room_by_id("room-a").is_some());
        assert!(cat.room_by_id("room-a").is_some());
        assert!(cat.room_by_id("missing").is_none());
        cat.clear();
        assert!(cat.room_by_id("room-a").is_some());
    }
}
