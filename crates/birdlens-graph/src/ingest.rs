//! Builds graph entities from executed step results.
//!
//! Each endpoint family has its own mapping from response shape to nodes and
//! edges. Records that cannot be mapped are skipped with a log line, never an
//! error; partial data still yields a partial graph.

use serde_json::{Map, Value};

use birdlens_core::StepResult;

use crate::graph::{EdgeKind, EntityGraph, NodeKind};

impl EntityGraph {
    /// Fold one executed step into the graph. Failed steps and endpoints
    /// with no graph mapping are skipped, never errors.
    pub fn ingest(&mut self, result: &StepResult) {
        ingest_result(self, result);
    }

    /// Fold every step of a plan run into the graph, in order.
    pub fn ingest_all(&mut self, results: &[StepResult]) {
        for result in results {
            ingest_result(self, result);
        }
    }
}

fn ingest_result(graph: &mut EntityGraph, result: &StepResult) {
    if result.is_failure() {
        tracing::debug!(endpoint = %result.endpoint, "skipping failed step result");
        return;
    }
    let Some(data) = result.data() else {
        tracing::debug!(endpoint = %result.endpoint, "skipping step result without data");
        return;
    };
    if !truthy(data) {
        tracing::debug!(endpoint = %result.endpoint, "skipping empty step result");
        return;
    }

    let endpoint = result.endpoint.trim_start_matches('/');
    let params = result.executed_params.as_ref();

    match endpoint {
        "screenname.php" => {
            parse_and_add_user(graph, data);
        }
        "tweet.php" => {
            parse_and_add_tweet(graph, data);
        }
        "spaces.php" => ingest_space(graph, data),
        "timeline.php" | "usermedia.php" | "search.php" | "latest_replies.php" => {
            ingest_tweet_listing(graph, endpoint, data)
        }
        "listtimeline.php" | "community_timeline.php" => {
            ingest_container_timeline(graph, endpoint, data, params)
        }
        "followers.php" | "following.php" => ingest_follow_list(graph, endpoint, data, params),
        "retweets.php" => ingest_user_listing(graph, endpoint, data, "retweets"),
        "list_members.php" => {
            ingest_list_affiliation(graph, endpoint, data, params, "members", EdgeKind::MemberOf)
        }
        "list_followers.php" => ingest_list_affiliation(
            graph,
            endpoint,
            data,
            params,
            "followers",
            EdgeKind::FollowsList,
        ),
        "screennames.php" => ingest_user_listing(graph, endpoint, data, "users"),
        other => {
            tracing::debug!(endpoint = other, "no graph mapping for endpoint");
        }
    }
}

/// Tweets under a `timeline` key, plus the queried account when the response
/// carries a top-level `user` object.
fn ingest_tweet_listing(graph: &mut EntityGraph, endpoint: &str, data: &Value) {
    match data.get("timeline").and_then(Value::as_array) {
        Some(timeline) => {
            tracing::debug!(endpoint, tweet_count = timeline.len(), "parsing tweets");
            for tweet in timeline {
                parse_and_add_tweet(graph, tweet);
            }
        }
        None => {
            tracing::warn!(endpoint, "expected 'timeline' list not found in response");
        }
    }
    if let Some(user) = data.get("user").filter(|u| u.is_object()) {
        parse_and_add_user(graph, user);
    }
}

/// List or community timelines: the tweets themselves plus a containment
/// edge from the list/community node taken from the executed parameters.
fn ingest_container_timeline(
    graph: &mut EntityGraph,
    endpoint: &str,
    data: &Value,
    params: Option<&Map<String, Value>>,
) {
    let container = params.and_then(|p| {
        if let Some(list_id) = p.get("list_id").and_then(id_text) {
            let node_id = format!("list_{}", list_id);
            Some((node_id, NodeKind::List, "list_id", list_id))
        } else if let Some(community_id) = p.get("community_id").and_then(id_text) {
            let node_id = format!("community_{}", community_id);
            Some((node_id, NodeKind::Community, "community_id", community_id))
        } else {
            None
        }
    });

    let Some(timeline) = data.get("timeline").and_then(Value::as_array) else {
        tracing::warn!(endpoint, "expected 'timeline' list not found in response");
        return;
    };

    let container_id = container.map(|(node_id, kind, key, id)| {
        let mut props = Map::new();
        props.insert(key.to_string(), Value::String(id));
        graph.upsert_node(node_id.clone(), kind, props);
        node_id
    });
    if container_id.is_none() {
        tracing::warn!(endpoint, "no list/community id in executed params");
    }

    for tweet in timeline {
        let tweet_node = parse_and_add_tweet(graph, tweet);
        if let (Some(container_id), Some(tweet_node)) = (container_id.as_ref(), tweet_node) {
            graph.add_edge(container_id.clone(), tweet_node, EdgeKind::ContainsTweet);
        }
    }
}

/// Follower/following listings: user nodes always, plus direction-correct
/// `Follows` edges when the queried screen name is known.
fn ingest_follow_list(
    graph: &mut EntityGraph,
    endpoint: &str,
    data: &Value,
    params: Option<&Map<String, Value>>,
) {
    let user_list = ["followers", "following", "retweets", "members"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_array));
    let Some(user_list) = user_list else {
        tracing::warn!(endpoint, "expected user list not found in response");
        return;
    };

    let source_id = params
        .and_then(|p| p.get("screenname"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(user_node_id);
    if let Some(source_id) = &source_id {
        let mut props = Map::new();
        props.insert(
            "screen_name".to_string(),
            params
                .and_then(|p| p.get("screenname"))
                .cloned()
                .unwrap_or(Value::Null),
        );
        graph.upsert_node(source_id.clone(), NodeKind::User, props);
    } else {
        tracing::warn!(endpoint, "no screenname in executed params, adding nodes only");
    }

    tracing::debug!(endpoint, user_count = user_list.len(), "parsing users");
    for user in user_list {
        let Some(target_id) = parse_and_add_user(graph, user) else {
            continue;
        };
        if let Some(source_id) = &source_id {
            match endpoint {
                "following.php" => {
                    graph.add_edge(source_id.clone(), target_id, EdgeKind::Follows)
                }
                "followers.php" => {
                    graph.add_edge(target_id, source_id.clone(), EdgeKind::Follows)
                }
                _ => {}
            }
        }
    }
}

/// Plain user listings under a known key (retweeters, batch lookups).
fn ingest_user_listing(graph: &mut EntityGraph, endpoint: &str, data: &Value, key: &str) {
    match data.get(key).and_then(Value::as_array) {
        Some(users) => {
            tracing::debug!(endpoint, user_count = users.len(), "parsing users");
            for user in users {
                parse_and_add_user(graph, user);
            }
        }
        None => {
            tracing::warn!(endpoint, key, "expected user list not found in response");
        }
    }
}

/// List membership or list following: the list node plus one edge per user.
fn ingest_list_affiliation(
    graph: &mut EntityGraph,
    endpoint: &str,
    data: &Value,
    params: Option<&Map<String, Value>>,
    key: &str,
    edge_kind: EdgeKind,
) {
    let user_list = data.get(key).and_then(Value::as_array);
    let list_id = params.and_then(|p| p.get("list_id")).and_then(id_text);
    let (Some(user_list), Some(list_id)) = (user_list, list_id) else {
        tracing::warn!(endpoint, key, "expected user list or list_id param not found");
        return;
    };

    let list_node_id = format!("list_{}", list_id);
    let mut props = Map::new();
    props.insert("list_id".to_string(), Value::String(list_id));
    graph.upsert_node(list_node_id.clone(), NodeKind::List, props);

    tracing::debug!(endpoint, user_count = user_list.len(), "parsing list users");
    for user in user_list {
        if let Some(user_id) = parse_and_add_user(graph, user) {
            graph.add_edge(user_id, list_node_id.clone(), edge_kind);
        }
    }
}

/// A live audio space: the space node, its creator, and admin/speaker edges.
fn ingest_space(graph: &mut EntityGraph, data: &Value) {
    let Some(space_id) = data.get("id").and_then(id_text) else {
        tracing::warn!("could not find space id in response");
        return;
    };
    let space_node_id = format!("space_{}", space_id);

    let creator_sn = data
        .get("creator")
        .and_then(|c| c.get("screenname"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());

    let mut props = Map::new();
    props.insert("space_id".to_string(), Value::String(space_id));
    insert_value(&mut props, "state", data.get("state"));
    insert_value(&mut props, "started_at", data.get("started"));
    if let Some(creator_sn) = creator_sn {
        props.insert(
            "creator_screen_name".to_string(),
            Value::String(creator_sn.to_string()),
        );
    }
    graph.upsert_node(space_node_id.clone(), NodeKind::Space, props);

    if let Some(creator_sn) = creator_sn {
        let creator_id = add_minimal_user(graph, creator_sn);
        graph.add_edge(creator_id, space_node_id.clone(), EdgeKind::CreatedSpace);
    }

    for (role_key, edge_kind) in [
        ("admins", EdgeKind::AdminOf),
        ("speakers", EdgeKind::SpeakerIn),
    ] {
        let members = data
            .get("participants")
            .and_then(|p| p.get(role_key))
            .and_then(Value::as_array);
        let Some(members) = members else { continue };
        for member in members {
            let Some(sn) = member
                .get("screenname")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
            else {
                continue;
            };
            let member_id = add_minimal_user(graph, sn);
            graph.add_edge(member_id, space_node_id.clone(), edge_kind);
        }
    }
}

/// Upsert a user node from an API user object. Returns the node id, derived
/// from the lowercased screen name.
fn parse_and_add_user(graph: &mut EntityGraph, user_data: &Value) -> Option<String> {
    if !user_data.is_object() {
        return None;
    }

    let screen_name = first_truthy(user_data, &["screen_name", "profile"])
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    let Some(screen_name) = screen_name else {
        tracing::warn!("skipping user record with missing screen_name");
        return None;
    };
    let node_id = user_node_id(screen_name);

    let mut props = Map::new();
    props.insert(
        "screen_name".to_string(),
        Value::String(screen_name.to_string()),
    );
    if let Some(rest_id) = first_truthy(user_data, &["rest_id", "user_id", "id"]).and_then(id_text)
    {
        props.insert("rest_id".to_string(), Value::String(rest_id));
    }
    insert_value(&mut props, "name", user_data.get("name"));
    insert_value(
        &mut props,
        "description",
        first_truthy(user_data, &["description", "desc"]),
    );
    insert_value(
        &mut props,
        "avatar_url",
        first_truthy(user_data, &["avatar", "profile_image"]),
    );
    props.insert(
        "followers_count".to_string(),
        safe_count(first_truthy(user_data, &["followers_count", "sub_count"])).into(),
    );
    props.insert(
        "following_count".to_string(),
        safe_count(first_truthy(
            user_data,
            &["following_count", "friends_count", "friends"],
        ))
        .into(),
    );
    props.insert(
        "statuses_count".to_string(),
        safe_count(user_data.get("statuses_count")).into(),
    );
    insert_value(&mut props, "location", user_data.get("location"));
    insert_value(&mut props, "created_at", user_data.get("created_at"));
    props.insert(
        "blue_verified".to_string(),
        Value::Bool(user_data.get("blue_verified").map(truthy).unwrap_or(false)),
    );
    props.insert(
        "is_protected".to_string(),
        Value::Bool(user_data.get("protected").map(truthy).unwrap_or(false)),
    );

    graph.upsert_node(node_id.clone(), NodeKind::User, props);
    Some(node_id)
}

/// Upsert a tweet node plus its author, reply/quote/retweet/mention edges.
/// Quoted and retweeted tweets are ingested recursively. Returns the node id.
fn parse_and_add_tweet(graph: &mut EntityGraph, tweet_data: &Value) -> Option<String> {
    if !tweet_data.is_object() {
        return None;
    }

    let Some(tweet_id) = first_truthy(tweet_data, &["tweet_id", "id"]).and_then(id_text) else {
        tracing::warn!("skipping tweet record with missing tweet_id");
        return None;
    };

    let author = first_truthy(tweet_data, &["author", "user_info"]).filter(|a| a.is_object());
    let author_id = author.and_then(|a| parse_and_add_user(graph, a));
    let author_screen_name = author
        .and_then(|a| a.get("screen_name"))
        .and_then(Value::as_str);

    let retweeted = first_truthy(tweet_data, &["retweeted_tweet", "retweeted"]);
    let quoted = tweet_data.get("quoted").filter(|q| truthy(q));
    let reply_to_id = first_truthy(
        tweet_data,
        &["in_reply_to_status_id_str", "in_reply_to_status_id"],
    )
    .and_then(id_text);

    let media_type = match tweet_data.get("media") {
        Some(media) if media.is_object() => {
            if media.get("video").map(truthy).unwrap_or(false) {
                "Video"
            } else if media.get("photo").map(truthy).unwrap_or(false) {
                "Photo"
            } else {
                "None"
            }
        }
        _ => "None",
    };

    let mut props = Map::new();
    props.insert("tweet_id".to_string(), Value::String(tweet_id.clone()));
    if let Some(author_sn) = author_screen_name {
        props.insert(
            "author_screen_name".to_string(),
            Value::String(author_sn.to_string()),
        );
    }
    insert_value(
        &mut props,
        "text",
        first_truthy(tweet_data, &["text", "display_text"]),
    );
    insert_value(&mut props, "created_at", tweet_data.get("created_at"));
    insert_value(
        &mut props,
        "conversation_id",
        tweet_data.get("conversation_id"),
    );
    insert_value(&mut props, "lang", tweet_data.get("lang"));
    props.insert(
        "views_count".to_string(),
        safe_count(tweet_data.get("views")).into(),
    );
    props.insert(
        "likes_count".to_string(),
        safe_count(first_truthy(tweet_data, &["favorites", "likes"])).into(),
    );
    props.insert(
        "retweets_count".to_string(),
        safe_count(tweet_data.get("retweets")).into(),
    );
    props.insert(
        "quotes_count".to_string(),
        safe_count(tweet_data.get("quotes")).into(),
    );
    props.insert(
        "replies_count".to_string(),
        safe_count(tweet_data.get("replies")).into(),
    );
    props.insert(
        "bookmarks_count".to_string(),
        safe_count(tweet_data.get("bookmarks")).into(),
    );
    if let Some(reply_to_id) = &reply_to_id {
        props.insert(
            "in_reply_to_status_id".to_string(),
            Value::String(reply_to_id.clone()),
        );
    }
    insert_value(
        &mut props,
        "in_reply_to_screen_name",
        tweet_data.get("in_reply_to_screen_name"),
    );
    props.insert("is_retweet".to_string(), Value::Bool(retweeted.is_some()));
    props.insert("is_quote".to_string(), Value::Bool(quoted.is_some()));
    props.insert("is_reply".to_string(), Value::Bool(reply_to_id.is_some()));
    props.insert(
        "media_type".to_string(),
        Value::String(media_type.to_string()),
    );

    graph.upsert_node(tweet_id.clone(), NodeKind::Tweet, props);

    if let Some(author_id) = author_id {
        graph.add_edge(author_id, tweet_id.clone(), EdgeKind::Posted);
    }

    if let Some(reply_to_id) = reply_to_id {
        graph.add_edge(tweet_id.clone(), reply_to_id, EdgeKind::IsReplyTo);
    }

    if let Some(quoted) = quoted.filter(|q| q.is_object()) {
        if let Some(quoted_id) = first_truthy(quoted, &["tweet_id", "id"]).and_then(id_text) {
            graph.add_edge(tweet_id.clone(), quoted_id, EdgeKind::IsQuoteOf);
            parse_and_add_tweet(graph, quoted);
        }
    }

    if let Some(retweeted) = retweeted.filter(|r| r.is_object()) {
        if let Some(original_id) = first_truthy(retweeted, &["tweet_id", "id"]).and_then(id_text) {
            graph.add_edge(tweet_id.clone(), original_id, EdgeKind::IsRetweetOf);
            parse_and_add_tweet(graph, retweeted);
        }
    }

    let mentions = tweet_data
        .get("entities")
        .and_then(|e| e.get("user_mentions"))
        .and_then(Value::as_array);
    if let Some(mentions) = mentions {
        for mention in mentions {
            let Some(sn) = mention
                .get("screen_name")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
            else {
                continue;
            };
            let mentioned_id = add_minimal_user(graph, sn);
            graph.add_edge(tweet_id.clone(), mentioned_id, EdgeKind::Mentions);
        }
    }

    Some(tweet_id)
}

/// Register a user known only by screen name, returning the node id.
fn add_minimal_user(graph: &mut EntityGraph, screen_name: &str) -> String {
    let node_id = user_node_id(screen_name);
    let mut props = Map::new();
    props.insert(
        "screen_name".to_string(),
        Value::String(screen_name.to_string()),
    );
    graph.upsert_node(node_id.clone(), NodeKind::User, props);
    node_id
}

/// Users are keyed case-insensitively; the API is not consistent about
/// screen name casing across endpoints.
fn user_node_id(screen_name: &str) -> String {
    screen_name.to_lowercase()
}

fn insert_value(props: &mut Map<String, Value>, key: &str, value: Option<&Value>) {
    if let Some(value) = value {
        if !value.is_null() {
            props.insert(key.to_string(), value.clone());
        }
    }
}

/// First value under any of the keys that is non-null and non-empty.
fn first_truthy<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| data.get(*key))
        .find(|v| truthy(v))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Identifier as text: strings pass through, numbers are stringified.
fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn safe_count(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(0),
        Some(Value::Bool(b)) => *b as i64,
        _ => 0,
    }
}
