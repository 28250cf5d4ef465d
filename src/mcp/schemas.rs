//! JSON schema builders for MCP tool inputs.

use serde_json::{Map, Value};

fn string_schema(description: &str) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("string".into()));
    schema.insert("description".into(), Value::String(description.into()));
    Value::Object(schema)
}

fn integer_schema(description: &str) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("integer".into()));
    schema.insert("description".into(), Value::String(description.into()));
    Value::Object(schema)
}

fn number_schema(description: &str) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("number".into()));
    schema.insert("description".into(), Value::String(description.into()));
    Value::Object(schema)
}

fn boolean_schema(description: &str) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("boolean".into()));
    schema.insert("description".into(), Value::String(description.into()));
    Value::Object(schema)
}

fn finalize_object_schema(properties: Map<String, Value>, required: &[&str]) -> Map<String, Value> {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("object".into()));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert(
            "required".into(),
            Value::Array(required.iter().map(|&key| Value::String(key.into())).collect()),
        );
    }
    schema.insert("additionalProperties".into(), Value::Bool(false));
    schema
}

pub(crate) fn empty_object_schema() -> Map<String, Value> {
    finalize_object_schema(Map::new(), &[])
}

pub(crate) fn collection_id_input_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("collection".into(), string_schema("Target collection id"));
    finalize_object_schema(properties, &["collection"])
}

pub(crate) fn create_collection_input_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("name".into(), string_schema("Collection name"));
    properties.insert("description".into(), string_schema("Optional free-form description"));
    finalize_object_schema(properties, &["name"])
}

pub(crate) fn save_file_input_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("collection".into(), string_schema("Target collection id"));
    properties.insert("folder".into(), string_schema("Folder path relative to the collection root"));
    properties.insert("name".into(), string_schema("File name, including extension"));
    properties.insert("content".into(), string_schema("UTF-8 file content"));
    properties.insert("source_url".into(), string_schema("Optional originating URL"));
    finalize_object_schema(properties, &["collection", "name", "content"])
}

pub(crate) fn read_file_input_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("file_id".into(), string_schema("File id returned by save_to_collection"));
    finalize_object_schema(properties, &["file_id"])
}

pub(crate) fn extract_input_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("url".into(), string_schema("URL to fetch and extract"));
    finalize_object_schema(properties, &["url"])
}

pub(crate) fn deep_crawl_input_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("url".into(), string_schema("Starting URL"));
    properties.insert("max_depth".into(), integer_schema("Maximum hop count to follow (default 1)"));
    properties.insert("max_pages".into(), integer_schema("Maximum number of pages to fetch (default 10)"));
    finalize_object_schema(properties, &["url"])
}

pub(crate) fn crawl_single_input_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("collection".into(), string_schema("Target collection id"));
    properties.insert("url".into(), string_schema("URL to fetch and save"));
    properties.insert("folder".into(), string_schema("Optional folder path within the collection"));
    finalize_object_schema(properties, &["collection", "url"])
}

pub(crate) fn search_input_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("query".into(), string_schema("Natural language query text"));
    properties.insert("collection".into(), string_schema("Collection to search"));
    properties.insert("limit".into(), integer_schema("Maximum number of results to return"));
    properties.insert("similarity_threshold".into(), number_schema("Minimum similarity score a result must meet"));
    properties.insert("expand_context".into(), boolean_schema("Materialize each result's related chunks"));
    finalize_object_schema(properties, &["query", "collection"])
}
