//! Shared Star Wars fixtures: schema, canned data and a root resolver for
//! the local-schema transport.

use std::sync::Arc;

use gql_client::{
    transport::{LocalSchemaTransport, Resolver},
    Schema, Variables,
};
use serde_json::json;

pub const STAR_WARS_SDL: &str = r#"
schema {
  query: Query
  mutation: Mutation
  subscription: Subscription
}

enum Episode {
  NEWHOPE
  EMPIRE
  JEDI
}

interface Character {
  id: String!
  name: String
  friends: [Character]
  appearsIn: [Episode]
}

type Human implements Character {
  id: String!
  name: String
  friends: [Character]
  appearsIn: [Episode]
  homePlanet: String
}

type Droid implements Character {
  id: String!
  name: String
  friends: [Character]
  appearsIn: [Episode]
  primaryFunction: String
}

type Review {
  episode: Episode
  stars: Int!
  commentary: String
}

input ReviewInput {
  stars: Int!
  commentary: String
}

type Query {
  hero(episode: Episode): Character
  human(id: String!): Human
  droid(id: String!): Droid
  characters(ids: [String]): [Character]
}

type Mutation {
  createReview(episode: Episode, review: ReviewInput!): Review
}

type Subscription {
  reviewAdded(episode: Episode): Review
}
"#;

pub fn star_wars_schema() -> Schema {
    Schema::from_type_definitions(STAR_WARS_SDL).expect("star wars SDL parses")
}

fn character(id: &str) -> Option<serde_json::Value> {
    let all = json!({
        "1000": {
            "id": "1000",
            "name": "Luke Skywalker",
            "friends": [{"name": "Han Solo"}, {"name": "Leia Organa"}],
            "appearsIn": ["NEWHOPE", "EMPIRE", "JEDI"],
            "homePlanet": "Tatooine",
        },
        "1001": {
            "id": "1001",
            "name": "Darth Vader",
            "friends": [{"name": "Wilhuff Tarkin"}],
            "appearsIn": ["NEWHOPE", "EMPIRE", "JEDI"],
            "homePlanet": "Tatooine",
        },
        "1003": {
            "id": "1003",
            "name": "Leia Organa",
            "friends": [{"name": "Luke Skywalker"}, {"name": "Han Solo"}],
            "appearsIn": ["NEWHOPE", "EMPIRE", "JEDI"],
            "homePlanet": "Alderaan",
        },
        "2001": {
            "id": "2001",
            "name": "R2-D2",
            "friends": [{"name": "Luke Skywalker"}, {"name": "Leia Organa"}],
            "appearsIn": ["NEWHOPE", "EMPIRE", "JEDI"],
        },
    });
    all.get(id).cloned()
}

/// Resolves the Star Wars root fields the way the reference fixtures do:
/// `hero` is R2-D2 unless asked for the hero of EMPIRE, lookups go by id,
/// and `createReview` echoes the input back.
pub struct StarWarsResolver;

impl Resolver for StarWarsResolver {
    fn resolve_field(
        &self,
        parent_type: &str,
        field: &str,
        arguments: &Variables,
        source: &serde_json::Value,
    ) -> Result<serde_json::Value, String> {
        match (parent_type, field) {
            ("Query", "hero") => {
                let id = match arguments.get("episode").and_then(|e| e.as_str()) {
                    Some("EMPIRE") => "1000",
                    _ => "2001",
                };
                character(id).ok_or_else(|| "hero not found".into())
            }
            ("Query", "human") | ("Query", "droid") => {
                let id = arguments
                    .get("id")
                    .and_then(|id| id.as_str())
                    .ok_or_else(|| format!("{field} requires an id"))?;
                Ok(character(id).unwrap_or(serde_json::Value::Null))
            }
            ("Query", "characters") => {
                let ids = arguments
                    .get("ids")
                    .and_then(|ids| ids.as_array())
                    .cloned()
                    .unwrap_or_default();
                Ok(ids
                    .iter()
                    .filter_map(|id| id.as_str())
                    .filter_map(character)
                    .collect())
            }
            ("Mutation", "createReview") => {
                let mut review = arguments
                    .get("review")
                    .cloned()
                    .ok_or_else(|| "review input is required".to_string())?;
                if let Some(entries) = review.as_object_mut() {
                    if let Some(episode) = arguments.get("episode") {
                        entries.insert("episode".into(), episode.clone());
                    }
                }
                Ok(review)
            }
            _ => Ok(source.get(field).cloned().unwrap_or(serde_json::Value::Null)),
        }
    }
}

pub fn star_wars_transport() -> LocalSchemaTransport {
    LocalSchemaTransport::new(Arc::new(star_wars_schema())).with_resolver(Arc::new(StarWarsResolver))
}
