/**
 * CfpRec
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use fnv::FnvHashMap;

use crate::error::{RecError, Result};
use crate::types::{self, IdSet, ItemId, Preference, UserId};

/// In-memory sparse user-item preference data, indexed both by user and by item. Preferences
/// of a user are kept sorted by item, preferences for an item are kept sorted by user.
pub struct RatingStore {
    user_ids: Vec<UserId>,
    item_ids: Vec<ItemId>,
    preferences_by_user: FnvHashMap<UserId, Vec<Preference>>,
    preferences_by_item: FnvHashMap<ItemId, Vec<Preference>>,
    num_preferences: usize,
}

impl RatingStore {

    /// Builds a store from raw preferences. If a (user, item) pair occurs more than once, the
    /// last occurrence wins.
    pub fn from_preferences<I>(preferences: I) -> Self
        where I: IntoIterator<Item=Preference> {

        let mut latest: FnvHashMap<(UserId, ItemId), f64> =
            FnvHashMap::with_capacity_and_hasher(100, Default::default());

        for preference in preferences {
            latest.insert((preference.user, preference.item), preference.value);
        }

        let mut preferences_by_user: FnvHashMap<UserId, Vec<Preference>> = types::new_id_map(10);
        let mut preferences_by_item: FnvHashMap<ItemId, Vec<Preference>> = types::new_id_map(10);

        for ((user, item), value) in latest.iter() {
            let preference = Preference::new(*user, *item, *value);
            preferences_by_user.entry(*user).or_insert_with(Vec::new).push(preference);
            preferences_by_item.entry(*item).or_insert_with(Vec::new).push(preference);
        }

        for preferences in preferences_by_user.values_mut() {
            preferences.sort_by_key(|preference| preference.item);
        }

        for preferences in preferences_by_item.values_mut() {
            preferences.sort_by_key(|preference| preference.user);
        }

        let mut user_ids: Vec<UserId> = preferences_by_user.keys().cloned().collect();
        user_ids.sort();

        let mut item_ids: Vec<ItemId> = preferences_by_item.keys().cloned().collect();
        item_ids.sort();

        RatingStore {
            user_ids,
            item_ids,
            preferences_by_user,
            preferences_by_item,
            num_preferences: latest.len(),
        }
    }

    /// All user ids in ascending order.
    pub fn user_ids(&self) -> &[UserId] {
        &self.user_ids
    }

    /// All item ids in ascending order.
    pub fn item_ids(&self) -> &[ItemId] {
        &self.item_ids
    }

    pub fn num_users(&self) -> usize {
        self.user_ids.len()
    }

    pub fn num_items(&self) -> usize {
        self.item_ids.len()
    }

    pub fn num_preferences(&self) -> usize {
        self.num_preferences
    }

    pub fn contains_user(&self, user: UserId) -> bool {
        self.preferences_by_user.contains_key(&user)
    }

    pub fn contains_item(&self, item: ItemId) -> bool {
        self.preferences_by_item.contains_key(&item)
    }

    pub fn preferences_from_user(&self, user: UserId) -> Result<&[Preference]> {
        self.preferences_by_user.get(&user)
            .map(|preferences| preferences.as_slice())
            .ok_or(RecError::UnknownUser(user))
    }

    pub fn preferences_for_item(&self, item: ItemId) -> Result<&[Preference]> {
        self.preferences_by_item.get(&item)
            .map(|preferences| preferences.as_slice())
            .ok_or(RecError::UnknownItem(item))
    }

    pub fn item_ids_from_user(&self, user: UserId) -> Result<IdSet> {
        let preferences = self.preferences_from_user(user)?;

        let mut items = types::new_id_set(preferences.len());
        items.extend(preferences.iter().map(|preference| preference.item));

        Ok(items)
    }

    pub fn num_users_with_preference_for(&self, item: ItemId) -> usize {
        self.preferences_by_item.get(&item)
            .map(|preferences| preferences.len())
            .unwrap_or(0)
    }

    /// Number of users that expressed a preference for both items, computed by merging the two
    /// sorted user lists.
    pub fn num_users_with_preference_for_both(&self, item_a: ItemId, item_b: ItemId) -> usize {
        let (users_a, users_b) = match (self.preferences_by_item.get(&item_a),
                                        self.preferences_by_item.get(&item_b)) {
            (Some(users_a), Some(users_b)) => (users_a, users_b),
            _ => return 0,
        };

        let mut count = 0;
        let (mut a, mut b) = (0, 0);

        while a < users_a.len() && b < users_b.len() {
            let (user_a, user_b) = (users_a[a].user, users_b[b].user);
            if user_a == user_b {
                count += 1;
                a += 1;
                b += 1;
            } else if user_a < user_b {
                a += 1;
            } else {
                b += 1;
            }
        }

        count
    }

    pub fn preference_value(&self, user: UserId, item: ItemId) -> Result<f64> {
        let preferences = self.preferences_from_user(user)?;

        preferences.binary_search_by_key(&item, |preference| preference.item)
            .map(|index| preferences[index].value)
            .map_err(|_| RecError::UnknownItem(item))
    }
}


#[cfg(test)]
mod tests {

    use super::RatingStore;
    use crate::types::Preference;

    fn store() -> RatingStore {
        RatingStore::from_preferences(vec![
            Preference::new(1, 10, 5.0),
            Preference::new(1, 11, 3.0),
            Preference::new(2, 10, 4.0),
            Preference::new(2, 12, 1.0),
            Preference::new(3, 12, 2.0),
            Preference::new(3, 10, 1.0),
            Preference::new(3, 10, 2.0),
        ])
    }

    #[test]
    fn indexes_by_user_and_item() {
        let store = store();

        assert_eq!(store.user_ids(), &[1, 2, 3]);
        assert_eq!(store.item_ids(), &[10, 11, 12]);
        assert_eq!(store.num_preferences(), 6);

        let items: Vec<u64> = store.preferences_from_user(3).unwrap().iter()
            .map(|preference| preference.item)
            .collect();
        assert_eq!(items, vec![10, 12]);

        assert_eq!(store.num_users_with_preference_for(10), 3);
        assert_eq!(store.num_users_with_preference_for(99), 0);
    }

    #[test]
    fn duplicate_preferences_keep_the_last_value() {
        assert_eq!(store().preference_value(3, 10).unwrap(), 2.0);
    }

    #[test]
    fn cooccurrence_counts() {
        let store = store();

        assert_eq!(store.num_users_with_preference_for_both(10, 12), 2);
        assert_eq!(store.num_users_with_preference_for_both(12, 10), 2);
        assert_eq!(store.num_users_with_preference_for_both(10, 10), 3);
        assert_eq!(store.num_users_with_preference_for_both(11, 12), 0);
        assert_eq!(store.num_users_with_preference_for_both(11, 99), 0);
    }

    #[test]
    fn unknown_ids_are_reported() {
        let store = store();

        assert!(store.preferences_from_user(7).unwrap_err().is_unknown_id());
        assert!(store.preferences_for_item(7).unwrap_err().is_unknown_id());
        assert!(store.preference_value(1, 12).unwrap_err().is_unknown_id());
        assert!(store.preference_value(9, 10).unwrap_err().is_unknown_id());
    }
}
