//! 컨테이너 복사용 tar 아카이브 생성
//!
//! Docker의 archive API는 tar 스트림만 받으므로 파일 하나를
//! 루트(`/`) 기준 상대 경로의 엔트리로 감쌉니다.

use testbed_core::types::FileCopy;

/// 파일 하나를 담은 tar 아카이브를 만듭니다.
pub fn single_file_tar(file: &FileCopy) -> std::io::Result<Vec<u8>> {
    let relative = file.path.trim_start_matches('/');
    if relative.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("'{}' is not a file path", file.path),
        ));
    }

    let mut header = tar::Header::new_gnu();
    header.set_size(file.content.len() as u64);
    header.set_mode(file.mode);
    header.set_mtime(0);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, relative, file.content.as_bytes())?;
    builder.into_inner()
}
