//! Deterministic two-store collection merge.

use std::collections::HashMap;

/// Merge the local and remote copies of a collection into one.
///
/// Entries are grouped by the key returned from `id_of`. An id present in
/// only one store is kept as-is. When both stores carry the id, the winner
/// is whole-record (never a field-level blend):
///
/// - with `timestamp_of` present, the greater timestamp wins; on a tie the
///   later-processed entry (remote) wins, which keeps the rule total.
/// - with `timestamp_of` absent, the later-processed entry wins outright.
///   Local is processed first and remote second, so remote wins same-key
///   conflicts. This is a weaker guarantee than the timestamped rule and
///   only used for kinds that carry no ordering key.
///
/// Output order is processing order: local-only and locally-won entries
/// first, remote-only entries appended. Callers wanting a display order
/// sort afterwards.
pub fn merge_collections<T, IdF, TsF>(
    local: Vec<T>,
    remote: Vec<T>,
    id_of: IdF,
    timestamp_of: Option<TsF>,
) -> Vec<T>
where
    IdF: Fn(&T) -> String,
    TsF: Fn(&T) -> i64,
{
    let mut merged: Vec<T> = Vec::with_capacity(local.len() + remote.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in local.into_iter().chain(remote) {
        let key = id_of(&item);
        match index.get(&key).copied() {
            Some(at) => {
                let keep_later = match &timestamp_of {
                    Some(ts) => ts(&item) >= ts(&merged[at]),
                    None => true,
                };
                if keep_later {
                    merged[at] = item;
                }
            }
            None => {
                index.insert(key, merged.len());
                merged.push(item);
            }
        }
    }

    merged
}

/// Timestamped merge: greater timestamp wins, ties keep remote.
pub fn merge_by_timestamp<T, IdF, TsF>(
    local: Vec<T>,
    remote: Vec<T>,
    id_of: IdF,
    timestamp_of: TsF,
) -> Vec<T>
where
    IdF: Fn(&T) -> String,
    TsF: Fn(&T) -> i64,
{
    merge_collections(local, remote, id_of, Some(timestamp_of))
}

/// Order-based merge for kinds without a timestamp: remote, processed
/// second, wins same-key conflicts.
pub fn merge_last_processed_wins<T, IdF>(local: Vec<T>, remote: Vec<T>, id_of: IdF) -> Vec<T>
where
    IdF: Fn(&T) -> String,
{
    merge_collections(local, remote, id_of, None::<fn(&T) -> i64>)
}
