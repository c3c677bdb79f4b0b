use crate::types::{InfraError, InfraResult};
use std::fs::File;
use std::io::{BufReader, Read};

/// ファイルパスからBufReaderを作成する
/// パースやデータ変換は呼び出し側で行う
pub fn load_file(file_path: &str) -> InfraResult<BufReader<File>> {
    let file = File::open(file_path).map_err(|e| InfraError::file_system(file_path, e))?;
    Ok(BufReader::new(file))
}

/// テキストファイル全体を文字列として読み込む
pub fn read_text_file(file_path: &str) -> InfraResult<String> {
    let mut reader = load_file(file_path)?;
    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .map_err(|e| InfraError::file_system(file_path, e))?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_existing_file() {
        // 存在するファイルを読み込めることを確認
        let result = read_text_file("Cargo.toml");
        assert!(result.is_ok(), "既存ファイルの読み込みに失敗");
        assert!(result.unwrap().contains("[package]"));
    }

    #[test]
    fn test_load_non_existing_file() {
        // 存在しないファイルでエラーになることを確認
        let result = load_file("non_existent_file.txt");
        assert!(
            matches!(result, Err(InfraError::FileSystem { .. })),
            "存在しないファイルでエラーにならなかった"
        );
    }
}
