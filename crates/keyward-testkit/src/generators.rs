//! Proptest generators for property-based testing.

use proptest::prelude::*;

use keyward_core::{AccessObject, ObjectId, SymmetricKey, UserId, WrappedKey};

/// Generate a random UserId.
pub fn user_id() -> impl Strategy<Value = UserId> {
    any::<[u8; 16]>().prop_map(UserId::from_bytes)
}

/// Generate a random ObjectId.
pub fn object_id() -> impl Strategy<Value = ObjectId> {
    any::<[u8; 16]>().prop_map(ObjectId::from_bytes)
}

/// Generate a random 256-bit key.
pub fn symmetric_key() -> impl Strategy<Value = SymmetricKey> {
    any::<[u8; 32]>().prop_map(SymmetricKey::from_bytes)
}

/// Generate payload bytes of at most `max_len`.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate up to `max` users, possibly with duplicates.
pub fn users(max: usize) -> impl Strategy<Value = Vec<UserId>> {
    prop::collection::vec(user_id(), 0..=max)
}

/// Generate an Access Object with a creator, extra members and a version.
pub fn access_object() -> impl Strategy<Value = AccessObject> {
    (user_id(), users(8), payload(72), 0u64..1_000).prop_map(
        |(creator, members, wrapped, version)| {
            let mut ao = AccessObject::new(creator, WrappedKey::from_bytes(wrapped));
            for member in members {
                ao.add_user(member);
            }
            for _ in 0..version {
                ao.increment_version();
            }
            ao
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_core::{Cryptor, MacDomain, MessageAuthenticator};

    proptest! {
        #[test]
        fn access_object_members_stay_sorted(ao in access_object()) {
            let users = ao.users();
            prop_assert!(users.windows(2).all(|w| w[0] < w[1]));
        }

        #[test]
        fn access_object_cbor_preserves_record(ao in access_object()) {
            let decoded = AccessObject::from_bytes(&ao.to_bytes().unwrap()).unwrap();
            prop_assert_eq!(decoded, ao);
        }

        #[test]
        fn envelope_round_trip(
            kek in symmetric_key(),
            plaintext in payload(512),
            aad in payload(64),
        ) {
            let cryptor = Cryptor::new(&kek);
            let (wrapped, ciphertext) = cryptor.encrypt(&plaintext, &aad).unwrap();
            prop_assert_eq!(cryptor.decrypt(&wrapped, &ciphertext, &aad).unwrap(), plaintext);
        }

        #[test]
        fn mac_is_bound_to_context(
            ask in symmetric_key(),
            a in object_id(),
            b in object_id(),
            message in payload(128),
        ) {
            prop_assume!(a != b);
            let mac = MessageAuthenticator::new(&ask, MacDomain::AccessObjects);
            let tag = mac.tag(a.as_bytes(), &message);
            prop_assert!(mac.verify(a.as_bytes(), &message, tag.as_bytes()));
            prop_assert!(!mac.verify(b.as_bytes(), &message, tag.as_bytes()));
        }
    }
}
