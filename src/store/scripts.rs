// =============================================================================
// Server-Side Atomic Scripts
// =============================================================================
//
// Every mutation against a session document is expressed as a single Lua
// script so two concurrent writers (client request handling, analysis
// completion, market update) can never interleave a read/modify/write phase
// against the same key. Scripts use the document store's RedisJSON-compatible
// path commands (`JSON.SET`, `JSON.GET`, `JSON.ARRAPPEND`) for O(1) array
// append and partial reads, never a whole-document `GET` + re-`SET`.
//
// Each script also refreshes the key's TTL in the same atomic unit, so "every
// mutation refreshes TTL" is a property of the script, not a caller
// obligation.
// =============================================================================

/// `ensure(sid, initial_json, ttl_secs)` — create-if-absent, single command.
/// Returns the document that now exists under the key (the pre-existing one,
/// or the freshly inserted `initial_json`).
pub const ENSURE: &str = r#"
redis.call('JSON.SET', KEYS[1], '$', ARGV[1], 'NX')
redis.call('EXPIRE', KEYS[1], ARGV[2])
return redis.call('JSON.GET', KEYS[1])
"#;

/// `read(sid, ttl_secs)` — single-command read with TTL refresh.
/// Returns `false` if the key does not exist.
pub const READ: &str = r#"
local doc = redis.call('JSON.GET', KEYS[1])
if not doc then
  return false
end
redis.call('EXPIRE', KEYS[1], ARGV[1])
return doc
"#;

/// `begin_analysis(sid, current_analysis_json, last_activity_json, ttl_secs)`
/// — atomically sets `current_analysis` and `last_activity`, returns the
/// full post-mutation document. Returns `false` if the key does not exist.
pub const BEGIN_ANALYSIS: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return false
end
redis.call('JSON.SET', KEYS[1], '$.current_analysis', ARGV[1])
redis.call('JSON.SET', KEYS[1], '$.last_activity', ARGV[2])
redis.call('EXPIRE', KEYS[1], ARGV[3])
return redis.call('JSON.GET', KEYS[1])
"#;

/// `append_result(sid, result_json, last_activity_json, ttl_secs)` —
/// atomically appends to `analysis_results` via `JSON.ARRAPPEND` (O(1), not
/// a read-modify-write of the whole document) and bumps `last_activity`.
/// Returns `false` if the key does not exist.
pub const APPEND_RESULT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return false
end
redis.call('JSON.ARRAPPEND', KEYS[1], '$.analysis_results', ARGV[1])
redis.call('JSON.SET', KEYS[1], '$.last_activity', ARGV[2])
redis.call('EXPIRE', KEYS[1], ARGV[3])
return true
"#;

/// `apply_market_update(sid, prices_json, last_activity_json, ttl_secs)` —
/// atomically reads only the `holdings` path (not the whole document),
/// computes `Σ shares × price`, and writes `total_value` and
/// `last_activity` in one step. Returns the new `total_value`, or `false`
/// if the key does not exist.
pub const APPLY_MARKET_UPDATE: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return false
end
local holdings_json = redis.call('JSON.GET', KEYS[1], '$.holdings')
local holdings_wrap = cjson.decode(holdings_json)
local holdings = holdings_wrap[1]
local prices = cjson.decode(ARGV[1])
local total = 0.0
for ticker, shares in pairs(holdings) do
  local price = prices[ticker]
  if price ~= nil then
    total = total + (shares * price)
  end
end
redis.call('JSON.SET', KEYS[1], '$.total_value', tostring(total))
redis.call('JSON.SET', KEYS[1], '$.last_activity', ARGV[2])
redis.call('EXPIRE', KEYS[1], ARGV[3])
return tostring(total)
"#;

/// All mutating scripts, paired with a label used only for logging on
/// startup registration.
pub const ALL: &[(&str, &str)] = &[
    ("ensure", ENSURE),
    ("read", READ),
    ("begin_analysis", BEGIN_ANALYSIS),
    ("append_result", APPEND_RESULT),
    ("apply_market_update", APPLY_MARKET_UPDATE),
];
