//! Field schema registry.
//!
//! Each catalog category has a static, versioned list of expected fields.
//! The schema is configuration: it is never inferred from records, and a
//! record may carry fields the schema does not mention.
//!
//! Unknown categories resolve to an empty schema rather than an error so
//! read-only analysis degrades gracefully. Mutating operations check
//! [`FieldRegistry::schema`] themselves and reject unknown categories.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

/// Bumped whenever a built-in schema changes shape.
pub const SCHEMA_VERSION: u32 = 1;

/// JSON type expected for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

/// Description of one expected field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    /// Field key in the record. Serialized as the map key, not inline.
    #[serde(skip)]
    pub name: String,
    pub label: String,
    pub description: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    pub example: Value,
    pub help_text: String,
    /// Canonical value the standardizer may fill in when the field is missing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldDefinition {
    fn new(name: &str, label: &str, field_type: FieldType, required: bool) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            description: String::new(),
            field_type,
            required,
            min_length: None,
            max_length: None,
            example: Value::Null,
            help_text: String::new(),
            default: None,
        }
    }

    pub fn required(name: &str, label: &str, field_type: FieldType) -> Self {
        Self::new(name, label, field_type, true)
    }

    pub fn optional(name: &str, label: &str, field_type: FieldType) -> Self {
        Self::new(name, label, field_type, false)
    }

    pub fn describe(mut self, description: &str, help_text: &str) -> Self {
        self.description = description.to_string();
        self.help_text = help_text.to_string();
        self
    }

    pub fn example(mut self, example: Value) -> Self {
        self.example = example;
        self
    }

    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.min_length = Some(min);
        self.max_length = Some(max);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// The expected fields of one category, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    category: String,
    fields: Vec<FieldDefinition>,
}

impl FieldSchema {
    pub fn new(category: impl Into<String>, fields: Vec<FieldDefinition>) -> Self {
        Self {
            category: category.into(),
            fields,
        }
    }

    /// A schema with no expected fields.
    pub fn empty(category: impl Into<String>) -> Self {
        Self::new(category, Vec::new())
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn required_count(&self) -> usize {
        self.fields.iter().filter(|f| f.required).count()
    }
}

/// Serializes as `{ fieldName: FieldDefinition, ... }` in declaration order.
impl Serialize for FieldSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for field in &self.fields {
            map.serialize_entry(&field.name, field)?;
        }
        map.end()
    }
}

/// Lookup table of category schemas.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    schemas: Vec<FieldSchema>,
}

impl FieldRegistry {
    /// A registry with no categories.
    pub fn new() -> Self {
        Self {
            schemas: Vec::new(),
        }
    }

    /// The built-in catalog categories.
    pub fn builtin() -> Self {
        Self::new()
            .with_schema(nutrient_schema())
            .with_schema(ingredient_schema())
            .with_schema(pollutant_schema())
            .with_schema(product_schema())
    }

    /// Register (or replace) the schema for its category.
    pub fn with_schema(mut self, schema: FieldSchema) -> Self {
        self.schemas.retain(|s| s.category != schema.category);
        self.schemas.push(schema);
        self
    }

    pub fn categories(&self) -> Vec<&str> {
        self.schemas.iter().map(|s| s.category.as_str()).collect()
    }

    /// Schema for a known category.
    pub fn schema(&self, category: &str) -> Option<&FieldSchema> {
        self.schemas.iter().find(|s| s.category == category)
    }

    /// Schema for `category`, or an empty schema when the category is unknown.
    pub fn field_definitions(&self, category: &str) -> FieldSchema {
        self.schema(category)
            .cloned()
            .unwrap_or_else(|| FieldSchema::empty(category))
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============ Built-in schemas ============

fn common_head(category: &str, default_source: &str) -> Vec<FieldDefinition> {
    let category_example = match category {
        "nutrient" => "vitamin",
        "ingredient" => "sweetener",
        "pollutant" => "heavy-metal",
        _ => "beverage",
    };
    vec![
        FieldDefinition::required("name", "Name", FieldType::String)
            .describe("Display name", "Use the common English name, e.g. \"Vitamin C\".")
            .example(json!("Vitamin C"))
            .length(2, 120),
        FieldDefinition::required("category", "Category", FieldType::String)
            .describe(
                "Classification within the catalog",
                "Pick the closest classification; \"uncategorized\" if unsure.",
            )
            .example(json!(category_example))
            .default_value(json!("uncategorized")),
        FieldDefinition::required("description", "Description", FieldType::String)
            .describe(
                "Plain-language summary shown to end users",
                "Two or three sentences; avoid medical claims.",
            )
            .length(20, 2000),
        FieldDefinition::required("source", "Source", FieldType::String)
            .describe("Where the data came from", "Dataset or publisher, e.g. \"USDA\".")
            .example(json!("USDA"))
            .default_value(json!(default_source)),
        FieldDefinition::required("image_url", "Image URL", FieldType::String)
            .describe("Illustration shown next to the record", "Absolute https URL.")
            .example(json!("https://images.example.com/nutrient/vitamin-c.jpg")),
    ]
}

fn nutrient_schema() -> FieldSchema {
    use FieldType::{Array, Number, Object};
    let mut fields = common_head("nutrient", "catalog");
    fields.extend([
        FieldDefinition::required("unit", "Unit", FieldType::String)
            .describe("Unit of the daily value", "Lower-case SI abbreviation.")
            .example(json!("mg"))
            .default_value(json!("mg")),
        FieldDefinition::required("daily_value", "Daily value", Number)
            .describe("Recommended daily intake for adults", "Number in `unit`.")
            .example(json!(90)),
        FieldDefinition::required("food_sources", "Food sources", Array)
            .describe("Foods rich in this nutrient", "List of food names.")
            .example(json!(["orange", "kiwi"])),
        FieldDefinition::required("health_benefits", "Health benefits", Array)
            .describe("Documented benefits", "One short phrase per entry.")
            .example(json!(["supports immune function"])),
        FieldDefinition::required("per_100g", "Per 100 g", Object)
            .describe("Reference amounts per 100 g of typical sources", "Map of food to amount.")
            .example(json!({"orange": 53.2})),
        FieldDefinition::optional("scientific_name", "Scientific name", FieldType::String)
            .describe("Chemical or systematic name", "e.g. \"ascorbic acid\".")
            .example(json!("ascorbic acid")),
        FieldDefinition::optional("sources", "Reference sources", Array)
            .describe("All datasets that contributed to this record", "Merged on deduplication.")
            .example(json!(["USDA", "EFSA"])),
        FieldDefinition::optional("deficiency_symptoms", "Deficiency symptoms", Array)
            .describe("Symptoms of deficiency", "One short phrase per entry.")
            .example(json!(["fatigue"])),
        FieldDefinition::optional("per_serving", "Per serving", Object)
            .describe("Amounts per typical serving", "Map of food to amount.")
            .example(json!({"orange": 70.0})),
        FieldDefinition::optional("tags", "Tags", Array)
            .describe("Free-form search tags", "Lower-case words.")
            .example(json!(["antioxidant"])),
    ]);
    FieldSchema::new("nutrient", fields)
}

fn ingredient_schema() -> FieldSchema {
    use FieldType::Array;
    let mut fields = common_head("ingredient", "catalog");
    fields.extend([
        FieldDefinition::required("allergens", "Allergens", Array)
            .describe("Allergens the ingredient contains", "Use EU allergen names.")
            .example(json!(["milk"])),
        FieldDefinition::optional("origin", "Origin", FieldType::String)
            .describe("Plant, animal, mineral or synthetic", "Single word.")
            .example(json!("plant")),
        FieldDefinition::optional("e_number", "E number", FieldType::String)
            .describe("EU additive code, if any", "Format `E` followed by digits.")
            .example(json!("E300"))
            .length(2, 8),
        FieldDefinition::optional("nutrients", "Nutrients", Array)
            .describe("Nutrients the ingredient contributes", "Nutrient names.")
            .example(json!(["vitamin c"])),
        FieldDefinition::optional("aliases", "Aliases", Array)
            .describe("Alternative names on labels", "As printed on packaging.")
            .example(json!(["ascorbic acid"])),
        FieldDefinition::optional("tags", "Tags", Array)
            .describe("Free-form search tags", "Lower-case words.")
            .example(json!(["additive"])),
    ]);
    FieldSchema::new("ingredient", fields)
}

fn pollutant_schema() -> FieldSchema {
    use FieldType::{Array, Number};
    let mut fields = common_head("pollutant", "catalog");
    fields.extend([
        FieldDefinition::required("health_risks", "Health risks", Array)
            .describe("Documented health effects", "One short phrase per entry.")
            .example(json!(["neurotoxicity"])),
        FieldDefinition::required("exposure_sources", "Exposure sources", Array)
            .describe("Typical routes of exposure", "Foods, water, air, etc.")
            .example(json!(["tuna"])),
        FieldDefinition::required("safe_limit", "Safe limit", Number)
            .describe("Tolerable intake per kg body weight per week", "Number in `unit`.")
            .example(json!(1.3)),
        FieldDefinition::required("unit", "Unit", FieldType::String)
            .describe("Unit of the safe limit", "Lower-case SI abbreviation.")
            .example(json!("µg"))
            .default_value(json!("µg")),
        FieldDefinition::optional("regulatory_status", "Regulatory status", FieldType::String)
            .describe("Regulatory classification", "e.g. \"restricted\".")
            .example(json!("restricted")),
        FieldDefinition::optional("cas_number", "CAS number", FieldType::String)
            .describe("Chemical Abstracts Service registry number", "Digits and hyphens.")
            .example(json!("7439-97-6")),
        FieldDefinition::optional("tags", "Tags", Array)
            .describe("Free-form search tags", "Lower-case words.")
            .example(json!(["heavy metal"])),
    ]);
    FieldSchema::new("pollutant", fields)
}

fn product_schema() -> FieldSchema {
    use FieldType::{Array, Object};
    let mut fields = common_head("product", "catalog");
    fields.extend([
        FieldDefinition::required("brand", "Brand", FieldType::String)
            .describe("Brand or manufacturer", "As printed on the package.")
            .example(json!("Acme")),
        FieldDefinition::required("barcode", "Barcode", FieldType::String)
            .describe("EAN/UPC barcode", "Digits only.")
            .example(json!("4006381333931"))
            .length(8, 14),
        FieldDefinition::required("ingredients", "Ingredients", Array)
            .describe("Ingredient list in label order", "One ingredient per entry.")
            .example(json!(["water", "sugar"])),
        FieldDefinition::required("per_100g", "Per 100 g", Object)
            .describe("Nutrition facts per 100 g", "Map of nutrient to amount.")
            .example(json!({"sugar": 10.6})),
        FieldDefinition::optional("serving_size", "Serving size", FieldType::String)
            .describe("Serving size as printed", "Include the unit.")
            .example(json!("330 ml")),
        FieldDefinition::optional("per_serving", "Per serving", Object)
            .describe("Nutrition facts per serving", "Map of nutrient to amount.")
            .example(json!({"sugar": 35.0})),
        FieldDefinition::optional("allergens", "Allergens", Array)
            .describe("Declared allergens", "Use EU allergen names.")
            .example(json!(["milk"])),
        FieldDefinition::optional("tags", "Tags", Array)
            .describe("Free-form search tags", "Lower-case words.")
            .example(json!(["soft drink"])),
    ]);
    FieldSchema::new("product", fields)
}
