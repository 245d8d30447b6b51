//! Lua scripts run server-side so each store operation is atomic
//!
//! Redis executes a script without interleaving other commands, which gives
//! the same per-key atomicity as a shard lock in the in-memory store.

use redis::Script;

/// KEYS[1] counter; ARGV[1] ttl in milliseconds
///
/// Returns the new count. The expiry is only set when the counter is created.
const INCREMENT_AND_EXPIRE: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// KEYS[1] sorted set; ARGV: member, score, min_score, limit, ttl in milliseconds
///
/// Returns `{count, admitted, oldest_score or nil}`.
const ADMIT_TO_WINDOW: &str = r#"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', '(' .. ARGV[3])
redis.call('ZADD', KEYS[1], ARGV[2], ARGV[1])

local count = redis.call('ZCARD', KEYS[1])
local admitted = 1
if count > tonumber(ARGV[4]) then
    redis.call('ZREM', KEYS[1], ARGV[1])
    count = count - 1
    admitted = 0
end

if count > 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[5])
end

local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
return {count, admitted, oldest[2] or false}
"#;

/// KEYS[1] bucket; ARGV: expected encoding ('' when absent), new encoding,
/// ttl in milliseconds (0 keeps the bucket forever)
///
/// Returns 1 if the bucket was replaced, 0 if it no longer matched. Token
/// counts compare as numbers, since a spend script may have written the same
/// value in a different notation. Refill times compare as strings.
const COMPARE_AND_SET_BUCKET: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == false or ARGV[1] == '' then
    if current ~= false or ARGV[1] ~= '' then
        return 0
    end
else
    local tokens, last = string.match(current, '^([^:]+):(.+)$')
    local want_tokens, want_last = string.match(ARGV[1], '^([^:]+):(.+)$')
    if tokens == nil or last ~= want_last or tonumber(tokens) ~= tonumber(want_tokens) then
        return 0
    end
end

local ttl = tonumber(ARGV[3])
if ttl > 0 then
    redis.call('SET', KEYS[1], ARGV[2], 'PX', ttl)
else
    redis.call('SET', KEYS[1], ARGV[2])
end
return 1
"#;

/// KEYS[1] bucket; ARGV: capacity, tokens per second, cost, now in
/// nanoseconds, ttl in milliseconds (0 keeps the bucket forever)
///
/// Refills and spends in one step. Returns `{allowed, tokens left}` with the
/// token count as a string so fractions survive the reply.
///
/// Lua numbers are doubles, so nanosecond timestamps lose their low digits in
/// arithmetic. The refill time is therefore written back as the string it
/// arrived as, never recomputed.
const SPEND_FROM_BUCKET: &str = r#"
local capacity = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local cost = tonumber(ARGV[3])
local now = ARGV[4]
local ttl = tonumber(ARGV[5])

local tokens = capacity
local last = now
local stored = redis.call('GET', KEYS[1])
if stored then
    local stored_tokens, stored_last = string.match(stored, '^([^:]+):(%-?%d+)$')
    tokens = stored_tokens and tonumber(stored_tokens)
    if tokens == nil or tokens ~= tokens or tokens < 0 then
        return redis.error_reply('CORRUPT bucket value ' .. stored)
    end
    last = stored_last
end

local elapsed = (tonumber(now) - tonumber(last)) / 1e9
if elapsed > 0 then
    last = now
else
    elapsed = 0
end
tokens = math.min(capacity, tokens + elapsed * rate)

local allowed = 0
if tokens >= cost then
    tokens = tokens - cost
    allowed = 1
end

local encoded = string.format('%.17g', tokens)
if ttl > 0 then
    redis.call('SET', KEYS[1], encoded .. ':' .. last, 'PX', ttl)
else
    redis.call('SET', KEYS[1], encoded .. ':' .. last)
end
return {allowed, encoded}
"#;

pub(crate) struct Scripts {
    pub increment_and_expire: Script,
    pub admit_to_window: Script,
    pub compare_and_set_bucket: Script,
    pub spend_from_bucket: Script,
}

impl Scripts {
    pub fn new() -> Self {
        Scripts {
            increment_and_expire: Script::new(INCREMENT_AND_EXPIRE),
            admit_to_window: Script::new(ADMIT_TO_WINDOW),
            compare_and_set_bucket: Script::new(COMPARE_AND_SET_BUCKET),
            spend_from_bucket: Script::new(SPEND_FROM_BUCKET),
        }
    }
}
